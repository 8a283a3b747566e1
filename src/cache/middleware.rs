//! Response cache middleware.
//!
//! `GET` requests are served from the store when an entry exists; misses run
//! the handler and persist a successful result in the background.
//! Every other method runs the handler and, once it succeeds, drops every
//! cached variant sharing the request's key prefix. A store failure never
//! blocks or alters the handler's response.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{
    CacheConfig, RouteCacheConfig,
    background::BackgroundTasks,
    completion::{CompletionHook, Notification, finalize_response},
    entry::{CacheEntry, mark_cache_status},
    keys::{KeyConfig, build_key, build_prefix},
    metric_names::{
        METRIC_CACHE_BYPASS, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED_KEYS, METRIC_CACHE_MISS,
        METRIC_CACHE_STORE_ERROR, METRIC_CACHE_WRITE,
    },
    request::RequestDescriptor,
    store::CacheStore,
    whitelist::{WhitelistMatcher, WhitelistPatternError},
};

const TARGET: &str = "server_side_cache::cache";

/// One cache middleware instance: a store handle plus its write policy.
///
/// Route groups obtain their middleware state through [`ResponseCache::route`];
/// they all share this instance's store and background task set.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    background: Arc<BackgroundTasks>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            background: Arc::new(BackgroundTasks::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.store)
    }

    /// Build middleware state for one route group.
    ///
    /// Whitelist patterns are compiled here; a malformed pattern is returned
    /// as an error so it surfaces at startup.
    pub fn route(&self, route: RouteCacheConfig) -> Result<RouteCache, WhitelistPatternError> {
        let whitelist = WhitelistMatcher::new(&route.whitelist)?;
        Ok(RouteCache {
            inner: Arc::new(RouteCacheInner {
                store: Arc::clone(&self.store),
                key: route.key,
                whitelist,
                ttl_seconds: self.config.ttl_seconds,
                max_body_bytes: self.config.max_body_bytes,
                background: Arc::clone(&self.background),
            }),
        })
    }

    /// Wait for in-flight cache writes and invalidations.
    pub async fn drain(&self) {
        self.background.drain().await;
    }

    /// Drain background work and release the store handle.
    pub async fn close(self) {
        self.background.drain().await;
        debug!(target: TARGET, "response cache closed");
    }
}

/// Per-route middleware state.
#[derive(Clone)]
pub struct RouteCache {
    inner: Arc<RouteCacheInner>,
}

struct RouteCacheInner {
    store: Arc<dyn CacheStore>,
    key: KeyConfig,
    whitelist: WhitelistMatcher,
    ttl_seconds: u64,
    max_body_bytes: usize,
    background: Arc<BackgroundTasks>,
}

impl RouteCache {
    pub fn key_config(&self) -> &KeyConfig {
        &self.inner.key
    }

    pub fn whitelist(&self) -> &WhitelistMatcher {
        &self.inner.whitelist
    }

    async fn serve_read(&self, request: Request<Body>, next: Next) -> Response {
        let inner = &self.inner;
        let key = {
            let descriptor = RequestDescriptor::from_request(&request);
            (!inner.whitelist.is_whitelisted(descriptor.path()))
                .then(|| build_key(&descriptor, &inner.key))
        };

        let Some(key) = key else {
            counter!(METRIC_CACHE_BYPASS).increment(1);
            debug!(target: TARGET, outcome = "bypass", "path is whitelisted");
            let mut response = next.run(request).await;
            mark_cache_status(&mut response, false);
            return response;
        };

        let cacheable = match inner.store.get(&key).await {
            Ok(Some(raw)) => match CacheEntry::deserialize(&raw) {
                Ok(entry) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    debug!(target: TARGET, outcome = "hit", key = %key, "serving cached response");
                    return entry.into_response();
                }
                Err(err) => {
                    counter!(METRIC_CACHE_STORE_ERROR, "op" => "decode").increment(1);
                    warn!(
                        target: TARGET,
                        op = "decode",
                        key = %key,
                        error = %err,
                        "discarding corrupted cache entry"
                    );
                    true
                }
            },
            Ok(None) => true,
            Err(err) => {
                counter!(METRIC_CACHE_STORE_ERROR, "op" => "get").increment(1);
                warn!(
                    target: TARGET,
                    op = "get",
                    key = %key,
                    error = %err,
                    "cache read failed; serving fresh response"
                );
                false
            }
        };

        counter!(METRIC_CACHE_MISS).increment(1);

        if !cacheable {
            let mut response = next.run(request).await;
            mark_cache_status(&mut response, false);
            return response;
        }

        debug!(target: TARGET, outcome = "miss", key = %key, "cache miss, executing handler");
        let hook = self.store_on_completion(key);
        let response = next.run(request).await;
        let mut response = finalize_response(response, hook, inner.max_body_bytes).await;
        mark_cache_status(&mut response, false);
        response
    }

    async fn serve_write(&self, request: Request<Body>, next: Next) -> Response {
        let prefix = build_prefix(&RequestDescriptor::from_request(&request), &self.inner.key);
        let hook = self.invalidate_on_completion(request.method().clone(), prefix);

        let response = next.run(request).await;
        let mut response = finalize_response(response, hook, self.inner.max_body_bytes).await;
        mark_cache_status(&mut response, false);
        response
    }

    fn store_on_completion(&self, key: String) -> CompletionHook {
        let store = Arc::clone(&self.inner.store);
        let background = Arc::clone(&self.inner.background);
        let ttl_seconds = self.inner.ttl_seconds;

        CompletionHook::arm(Method::GET, move |notification| {
            let Notification::Store { headers, body } = notification else {
                return;
            };
            let Some(entry) = CacheEntry::capture(&headers, &body) else {
                debug!(target: TARGET, key = %key, "response body is not text; not caching");
                return;
            };
            let value = match entry.serialize() {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        target: TARGET,
                        op = "encode",
                        key = %key,
                        error = %err,
                        "failed to encode cache entry"
                    );
                    return;
                }
            };

            background.spawn(async move {
                match store.set_with_expiry(&key, ttl_seconds, value).await {
                    Ok(()) => {
                        counter!(METRIC_CACHE_WRITE).increment(1);
                        debug!(target: TARGET, key = %key, ttl_seconds, "cached response");
                    }
                    Err(err) => {
                        counter!(METRIC_CACHE_STORE_ERROR, "op" => "set").increment(1);
                        warn!(
                            target: TARGET,
                            op = "set",
                            key = %key,
                            error = %err,
                            "failed to write cache entry"
                        );
                    }
                }
            });
        })
    }

    fn invalidate_on_completion(&self, method: Method, prefix: String) -> CompletionHook {
        let store = Arc::clone(&self.inner.store);
        let background = Arc::clone(&self.inner.background);

        CompletionHook::arm(method, move |notification| {
            if notification == Notification::Invalidate {
                background.spawn(invalidate_prefix(store, prefix));
            }
        })
    }
}

/// Delete every entry built from `prefix`.
///
/// Keys are `prefix + URL` and URLs start with `/`, so the scan includes the
/// slash: account `1` must not match account `12`.
async fn invalidate_prefix(store: Arc<dyn CacheStore>, prefix: String) {
    let scope = format!("{prefix}/");
    let keys = match store.scan_keys_by_prefix(&scope).await {
        Ok(keys) => keys,
        Err(err) => {
            counter!(METRIC_CACHE_STORE_ERROR, "op" => "scan").increment(1);
            warn!(
                target: TARGET,
                op = "scan",
                prefix = %prefix,
                error = %err,
                "failed to list cache entries for invalidation"
            );
            return;
        }
    };

    let mut removed = 0u64;
    for key in &keys {
        match store.delete(key).await {
            Ok(()) => removed += 1,
            Err(err) => {
                counter!(METRIC_CACHE_STORE_ERROR, "op" => "delete").increment(1);
                warn!(
                    target: TARGET,
                    op = "delete",
                    key = %key,
                    error = %err,
                    "failed to delete cache entry"
                );
            }
        }
    }

    counter!(METRIC_CACHE_INVALIDATED_KEYS).increment(removed);
    debug!(
        target: TARGET,
        prefix = %prefix,
        matched = keys.len(),
        removed,
        "invalidated cached responses"
    );
}

/// Axum middleware entry point; attach with
/// `middleware::from_fn_with_state(route_cache, response_cache_layer)`.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<RouteCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::GET {
        cache.serve_read(request, next).await
    } else {
        cache.serve_write(request, next).await
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::StatusCode, middleware, routing::get};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::cache::{MemoryStore, entry::CACHE_STATUS_HEADER};

    fn app(cache: &ResponseCache, route: RouteCacheConfig) -> Router {
        let state = cache.route(route).expect("valid whitelist");
        Router::new()
            .route("/items", get(|| async { "fresh" }).put(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, response_cache_layer))
    }

    async fn call(router: &Router, method: Method, uri: &str) -> (StatusCode, String, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let marker = response
            .headers()
            .get(CACHE_STATUS_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, marker, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn corrupted_entry_is_replaced_by_fresh_response() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_raw("/items", "{broken", std::time::Duration::from_secs(60))
            .await;
        let cache = ResponseCache::new(store.clone(), CacheConfig::default());
        let router = app(&cache, RouteCacheConfig::default());

        let (status, marker, body) = call(&router, Method::GET, "/items").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(marker, "false");
        assert_eq!(body, "fresh");

        cache.drain().await;
        let (_, marker, body) = call(&router, Method::GET, "/items").await;
        assert_eq!(marker, "true");
        assert_eq!(body, "fresh");
    }

    #[tokio::test]
    async fn mutation_responses_carry_miss_marker() {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), CacheConfig::default());
        let router = app(&cache, RouteCacheConfig::default());

        let (status, marker, body) = call(&router, Method::PUT, "/items").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(marker, "false");
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn invalid_whitelist_is_rejected_when_building_route_state() {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), CacheConfig::default());
        let route = RouteCacheConfig::new(KeyConfig::default(), vec!["no-slash".to_string()]);
        assert!(cache.route(route).is_err());
    }

    #[tokio::test]
    async fn close_waits_for_pending_writes() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone(), CacheConfig::default());
        let router = app(&cache, RouteCacheConfig::default());

        let _ = call(&router, Method::GET, "/items").await;
        cache.close().await;
        assert_eq!(store.len().await, 1);
    }
}
