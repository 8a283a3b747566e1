mod ads;
mod middleware;

pub use ads::{AdView, UpdateOutcome, show_ad, update_ad};
pub use middleware::{ACCOUNT_COOKIE, account_context, log_responses};

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::cache::{RouteCache, response_cache_layer};

/// Demo router: every `/ads` route sits behind the response cache.
///
/// `account_context` runs before the cache so the `account_id` property is
/// available when keys are built.
pub fn build_router(cache: RouteCache) -> Router {
    Router::new()
        .route("/ads/{id}", get(show_ad).put(update_ad))
        .route("/ads/in/whitelist/{id}", get(show_ad))
        .layer(axum_middleware::from_fn_with_state(
            cache,
            response_cache_layer,
        ))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(account_context))
}
