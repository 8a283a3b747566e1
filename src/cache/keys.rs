//! Cache key construction.
//!
//! A key is `prefix + full URL`. The prefix only carries the configured
//! request properties and headers, so every cached variant of one logical
//! resource (same account, same selected headers) shares it and can be
//! invalidated together.
//!
//! Rendered values never contain `/` or `:`: they are percent-encoded, so a
//! prefix followed by `/` matches exactly the keys built from it.

use std::borrow::Cow;

use serde::Deserialize;

use super::request::RequestDescriptor;

/// Rendered in place of a configured property or header the request lacks.
pub const ABSENT_VALUE: &str = "undefined";

const PROPS_LABEL: &str = "req_props:";
const HEADERS_LABEL: &str = "headers:";
const SEPARATOR: &str = ":";

/// Per-route selection of request attributes that partition the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Request properties, joined in the order given.
    pub properties: Vec<String>,
    /// Header names, sorted before rendering.
    pub headers: Vec<String>,
}

impl KeyConfig {
    pub fn new(properties: Vec<String>, headers: Vec<String>) -> Self {
        Self {
            properties,
            headers,
        }
    }

    pub fn with_properties<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
            headers: Vec::new(),
        }
    }
}

/// Render the key prefix for a request.
///
/// Missing properties and headers render as [`ABSENT_VALUE`]; construction
/// never fails.
pub fn build_prefix(request: &RequestDescriptor<'_>, config: &KeyConfig) -> String {
    let mut prefix = String::new();

    if !config.properties.is_empty() {
        prefix.push_str(PROPS_LABEL);
        let rendered = config
            .properties
            .iter()
            .map(|name| render_term(name, request.property(name)))
            .collect::<Vec<_>>();
        prefix.push_str(&rendered.join(SEPARATOR));
    }

    if !config.headers.is_empty() {
        let mut names: Vec<&str> = config.headers.iter().map(String::as_str).collect();
        names.sort_unstable();

        prefix.push_str(HEADERS_LABEL);
        let rendered = names
            .into_iter()
            .map(|name| render_term(name, request.header(name)))
            .collect::<Vec<_>>();
        prefix.push_str(&rendered.join(SEPARATOR));
    }

    prefix
}

/// Full cache key: the prefix followed by the raw URL, query string included.
pub fn build_key(request: &RequestDescriptor<'_>, config: &KeyConfig) -> String {
    let mut key = build_prefix(request, config);
    key.push_str(request.full_url());
    key
}

fn render_term(name: &str, value: Option<&str>) -> String {
    format!(
        "{name}{SEPARATOR}{}",
        escape_value(value.unwrap_or(ABSENT_VALUE))
    )
}

fn escape_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['%', '/', ':']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 6);
    for ch in value.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            ':' => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
