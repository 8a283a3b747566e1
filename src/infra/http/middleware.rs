use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use crate::cache::{CACHE_STATUS_HEADER, RequestContext};

/// Cookie carrying the caller's account identifier.
pub const ACCOUNT_COOKIE: &str = "account_id";

/// Expose the caller's account to the cache layer as the `account_id` property.
pub async fn account_context(jar: CookieJar, mut request: Request<Body>, next: Next) -> Response {
    let mut context = request
        .extensions_mut()
        .remove::<RequestContext>()
        .unwrap_or_default();

    if let Some(cookie) = jar.get(ACCOUNT_COOKIE) {
        context.insert(ACCOUNT_COOKIE, cookie.value());
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let cached = response
        .headers()
        .get(CACHE_STATUS_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if status.is_client_error() || status.is_server_error() {
        warn!(
            target: "server_side_cache::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            cached,
            "request failed",
        );
    } else {
        info!(
            target: "server_side_cache::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            cached,
            "request served",
        );
    }

    response
}
