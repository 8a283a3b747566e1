//! Request view consumed by the cache layer.

use std::collections::BTreeMap;

use axum::{
    body::Body,
    extract::OriginalUri,
    http::{HeaderMap, Method, Request},
};

static EMPTY_CONTEXT: RequestContext = RequestContext::new();

/// Named request properties populated by upstream middleware.
///
/// Upstream layers (authentication, tenancy) insert this into the request
/// extensions before the cache layer runs; [`KeyConfig::properties`] refers
/// to its entries by name.
///
/// [`KeyConfig::properties`]: super::KeyConfig::properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    properties: BTreeMap<String, String>,
}

impl RequestContext {
    pub const fn new() -> Self {
        Self {
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Borrowed, read-only view of one request.
#[derive(Debug, Clone, Copy)]
pub struct RequestDescriptor<'a> {
    method: &'a Method,
    full_url: &'a str,
    headers: &'a HeaderMap,
    context: &'a RequestContext,
}

impl<'a> RequestDescriptor<'a> {
    pub fn new(
        method: &'a Method,
        full_url: &'a str,
        headers: &'a HeaderMap,
        context: &'a RequestContext,
    ) -> Self {
        Self {
            method,
            full_url,
            headers,
            context,
        }
    }

    /// Build the view from an axum request.
    ///
    /// Prefers [`OriginalUri`] so nested routers still key on the URL the
    /// client sent.
    pub fn from_request(request: &'a Request<Body>) -> Self {
        let uri = request
            .extensions()
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or_else(|| request.uri());
        let full_url = uri
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/");
        let context = request
            .extensions()
            .get::<RequestContext>()
            .unwrap_or(&EMPTY_CONTEXT);

        Self::new(request.method(), full_url, request.headers(), context)
    }

    pub fn method(&self) -> &'a Method {
        self.method
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Path and raw query string, exactly as received.
    pub fn full_url(&self) -> &'a str {
        self.full_url
    }

    pub fn path(&self) -> &'a str {
        match self.full_url.split_once('?') {
            Some((path, _)) => path,
            None => self.full_url,
        }
    }

    pub fn property(&self, name: &str) -> Option<&'a str> {
        self.context.get(name)
    }

    /// First value of `name`; non-UTF-8 values count as absent.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
