//! Persisted response entries.
//!
//! Wire format: a JSON array `[headers, body]` where `headers` is an object
//! of header name to value and `body` is the response text.

use std::collections::BTreeMap;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use thiserror::Error;

/// Response header reporting whether the body was replayed from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-server-side-cache";

static EXCLUDED_HEADERS: [HeaderName; 5] = [
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::DATE,
    header::SET_COOKIE,
];

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("failed to encode cache entry: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("corrupted cache entry: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl CacheEntry {
    /// Capture the replayable part of a finished response.
    ///
    /// Returns `None` when the body is not valid UTF-8, since the text wire
    /// format cannot carry it.
    pub fn capture(headers: &HeaderMap, body: &Bytes) -> Option<Self> {
        let body = std::str::from_utf8(body).ok()?.to_string();
        Some(Self {
            headers: header_subset(headers),
            body,
        })
    }

    pub fn serialize(&self) -> Result<String, EntryError> {
        serde_json::to_string(&(&self.headers, &self.body)).map_err(EntryError::Encode)
    }

    pub fn deserialize(raw: &str) -> Result<Self, EntryError> {
        let (headers, body): (BTreeMap<String, String>, String) =
            serde_json::from_str(raw).map_err(EntryError::Decode)?;
        Ok(Self { headers, body })
    }

    /// Rebuild the response served on a cache hit.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = StatusCode::OK;

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("true"));

        response
    }
}

fn header_subset(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut subset: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if name.as_str() == CACHE_STATUS_HEADER || EXCLUDED_HEADERS.contains(name) {
            continue;
        }
        let Ok(value) = value.to_str() else {
            continue;
        };
        subset
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    subset
}

/// Mark a response with the cache status header.
pub fn mark_cache_status(response: &mut Response, hit: bool) {
    let value = if hit { "true" } else { "false" };
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("14"));
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("session=abc"));
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("false"));
        headers.append("vary", HeaderValue::from_static("accept"));
        headers.append("vary", HeaderValue::from_static("cookie"));
        headers
    }

    #[test]
    fn capture_keeps_replayable_headers_only() {
        let entry = CacheEntry::capture(&response_headers(), &Bytes::from_static(b"{\"ok\":true}"))
            .expect("utf-8 body");

        assert_eq!(
            entry.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            entry.headers.get("vary").map(String::as_str),
            Some("accept, cookie")
        );
        assert!(!entry.headers.contains_key("content-length"));
        assert!(!entry.headers.contains_key("set-cookie"));
        assert!(!entry.headers.contains_key(CACHE_STATUS_HEADER));
    }

    #[test]
    fn capture_rejects_binary_bodies() {
        let body = Bytes::from_static(&[0xff, 0xfe, 0x00]);
        assert!(CacheEntry::capture(&HeaderMap::new(), &body).is_none());
    }

    #[test]
    fn wire_format_is_headers_then_body() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        let entry = CacheEntry {
            headers,
            body: "hello".to_string(),
        };

        let raw = entry.serialize().unwrap();
        assert_eq!(raw, r#"[{"content-type":"text/plain"},"hello"]"#);
        assert_eq!(CacheEntry::deserialize(&raw).unwrap(), entry);
    }

    #[test]
    fn corrupted_entry_is_a_decode_error() {
        assert!(matches!(
            CacheEntry::deserialize("{not json"),
            Err(EntryError::Decode(_))
        ));
        assert!(matches!(
            CacheEntry::deserialize(r#"["only-one"]"#),
            Err(EntryError::Decode(_))
        ));
    }

    #[test]
    fn replayed_response_is_marked_as_hit() {
        let raw = r#"[{"content-type":"application/json"},"{\"date\":1}"]"#;
        let response = CacheEntry::deserialize(raw).unwrap().into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get(CACHE_STATUS_HEADER).unwrap(), "true");
    }
}
