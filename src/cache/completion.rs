//! One-shot response completion hook.
//!
//! The hook is armed before the downstream handler runs and fired when the
//! handler's response resolves, which in tower is the single point where a
//! response becomes final. Firing consumes the hook, so it cannot happen
//! twice for one request.

use axum::{
    body::{Body, HttpBody},
    http::{HeaderMap, Method, StatusCode},
    response::Response,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use tracing::{debug, warn};

/// Action the orchestrator takes for a finished response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Successful `GET` with a body: persist it.
    Store { headers: HeaderMap, body: Bytes },
    /// Successful mutation with a body: drop the cached variants.
    Invalidate,
}

/// How much of the final body the hook saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyState {
    Empty,
    Buffered(Bytes),
    /// Present, but not buffered (mutations, or too large to hold).
    Unobserved,
}

impl BodyState {
    fn is_present(&self) -> bool {
        match self {
            BodyState::Empty => false,
            BodyState::Buffered(bytes) => !bytes.is_empty(),
            BodyState::Unobserved => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyState,
}

impl Completion {
    /// Classify the completion for a request made with `method`.
    ///
    /// Only statuses below 300 are actionable, so a failed mutation leaves
    /// cached entries untouched.
    pub fn notification(self, method: &Method) -> Option<Notification> {
        if self.status.as_u16() >= 300 || !self.body.is_present() {
            return None;
        }

        if method == Method::GET {
            match self.body {
                BodyState::Buffered(body) => Some(Notification::Store {
                    headers: self.headers,
                    body,
                }),
                _ => None,
            }
        } else {
            Some(Notification::Invalidate)
        }
    }
}

type Observer = Box<dyn FnOnce(Notification) + Send>;

pub struct CompletionHook {
    method: Method,
    observer: Observer,
}

impl CompletionHook {
    /// Register `observer` for the actionable outcome of a `method` request.
    pub fn arm<F>(method: Method, observer: F) -> Self
    where
        F: FnOnce(Notification) + Send + 'static,
    {
        Self {
            method,
            observer: Box::new(observer),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Fire the hook; returns whether the observer ran.
    pub fn fire(self, completion: Completion) -> bool {
        match completion.notification(&self.method) {
            Some(notification) => {
                (self.observer)(notification);
                true
            }
            None => false,
        }
    }
}

/// Observe the final response, fire `hook`, and hand the response back.
///
/// `GET` bodies are buffered when their size is known and at most
/// `max_body_bytes`; anything else streams through untouched.
pub async fn finalize_response(
    response: Response,
    hook: CompletionHook,
    max_body_bytes: usize,
) -> Response {
    let status = response.status();
    let hint = response.body().size_hint();

    if hint.exact() == Some(0) {
        hook.fire(Completion {
            status,
            headers: response.headers().clone(),
            body: BodyState::Empty,
        });
        return response;
    }

    let wants_body = hook.method() == Method::GET && status.as_u16() < 300;
    let fits = hint
        .upper()
        .is_some_and(|upper| upper <= max_body_bytes as u64);

    if !wants_body || !fits {
        if wants_body {
            debug!(
                target: "server_side_cache::cache",
                status = status.as_u16(),
                limit = max_body_bytes,
                "response body too large or unbounded; not caching"
            );
        }
        hook.fire(Completion {
            status,
            headers: response.headers().clone(),
            body: BodyState::Unobserved,
        });
        return response;
    }

    let (parts, body) = response.into_parts();
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            hook.fire(Completion {
                status,
                headers: parts.headers.clone(),
                body: BodyState::Buffered(bytes.clone()),
            });
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            warn!(
                target: "server_side_cache::cache",
                status = status.as_u16(),
                error = %err,
                "failed to buffer response body; not caching"
            );
            hook.fire(Completion {
                status,
                headers: parts.headers.clone(),
                body: BodyState::Unobserved,
            });
            Response::from_parts(parts, Body::empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::response::IntoResponse;

    use super::*;

    fn recording_hook(method: Method) -> (CompletionHook, Arc<Mutex<Vec<Notification>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook = CompletionHook::arm(method, move |notification| {
            sink.lock().unwrap().push(notification);
        });
        (hook, seen)
    }

    fn completion(status: StatusCode, body: BodyState) -> Completion {
        Completion {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    #[test]
    fn successful_get_with_body_is_storable() {
        let body = Bytes::from_static(b"payload");
        let notification = completion(StatusCode::OK, BodyState::Buffered(body.clone()))
            .notification(&Method::GET);
        assert_eq!(
            notification,
            Some(Notification::Store {
                headers: HeaderMap::new(),
                body
            })
        );
    }

    #[test]
    fn get_without_body_or_with_error_is_not_storable() {
        assert!(
            completion(StatusCode::OK, BodyState::Empty)
                .notification(&Method::GET)
                .is_none()
        );
        assert!(
            completion(StatusCode::OK, BodyState::Buffered(Bytes::new()))
                .notification(&Method::GET)
                .is_none()
        );
        assert!(
            completion(StatusCode::OK, BodyState::Unobserved)
                .notification(&Method::GET)
                .is_none()
        );
        assert!(
            completion(
                StatusCode::MOVED_PERMANENTLY,
                BodyState::Buffered(Bytes::from_static(b"x"))
            )
            .notification(&Method::GET)
            .is_none()
        );
    }

    #[test]
    fn successful_mutation_invalidates() {
        for method in [Method::PUT, Method::POST, Method::DELETE, Method::PATCH] {
            assert_eq!(
                completion(StatusCode::OK, BodyState::Unobserved).notification(&method),
                Some(Notification::Invalidate)
            );
        }
    }

    #[test]
    fn failed_mutation_is_not_actionable() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::FOUND,
        ] {
            assert!(
                completion(status, BodyState::Unobserved)
                    .notification(&Method::PUT)
                    .is_none()
            );
        }
    }

    #[test]
    fn mutation_without_body_is_not_actionable() {
        assert!(
            completion(StatusCode::NO_CONTENT, BodyState::Empty)
                .notification(&Method::DELETE)
                .is_none()
        );
    }

    #[tokio::test]
    async fn finalize_buffers_get_body_and_preserves_response() {
        let (hook, seen) = recording_hook(Method::GET);
        let response = (StatusCode::OK, "hello").into_response();

        let response = finalize_response(response, hook, 1024).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"hello"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], Notification::Store { body, .. } if body == "hello"));
    }

    #[tokio::test]
    async fn finalize_skips_bodies_over_limit() {
        let (hook, seen) = recording_hook(Method::GET);
        let response = (StatusCode::OK, "0123456789").into_response();

        let response = finalize_response(response, hook, 4).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.len(), 10);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finalize_fires_invalidation_without_buffering() {
        let (hook, seen) = recording_hook(Method::PUT);
        let response = (StatusCode::OK, r#"{"ok":true}"#).into_response();

        let _ = finalize_response(response, hook, 1024).await;
        assert_eq!(*seen.lock().unwrap(), vec![Notification::Invalidate]);
    }

    #[tokio::test]
    async fn finalize_ignores_failed_mutation() {
        let (hook, seen) = recording_hook(Method::PUT);
        let response = (StatusCode::BAD_REQUEST, r#"{"ok":false}"#).into_response();

        let response = finalize_response(response, hook, 1024).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(seen.lock().unwrap().is_empty());
    }
}
