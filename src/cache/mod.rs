//! Server-side response cache.
//!
//! Sits in front of request handlers as axum middleware:
//!
//! - **Read-through**: `GET` responses are served from the store when an
//!   entry exists under the request's key, otherwise the handler runs and a
//!   successful response is persisted in the background.
//! - **Prefix invalidation**: a successful non-`GET` request deletes every
//!   entry sharing its key prefix. Failed mutations leave entries intact.
//! - **Fail-open**: store errors are logged and the handler runs as if no
//!   cache existed.
//!
//! Responses carry `x-server-side-cache: true` only when replayed.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! store_url = "redis://127.0.0.1/"
//! ttl_seconds = 60
//!
//! [cache.route]
//! properties = ["account_id"]
//! whitelist = ["/ads/in/whitelist/:id"]
//! ```

mod background;
mod completion;
mod config;
mod entry;
mod keys;
mod lock;
pub mod metric_names;
mod middleware;
mod request;
mod store;
mod whitelist;

pub use background::BackgroundTasks;
pub use completion::{BodyState, Completion, CompletionHook, Notification, finalize_response};
pub use config::{CacheConfig, RouteCacheConfig};
pub use entry::{CACHE_STATUS_HEADER, CacheEntry, EntryError, mark_cache_status};
pub use keys::{ABSENT_VALUE, KeyConfig, build_key, build_prefix};
pub use middleware::{ResponseCache, RouteCache, response_cache_layer};
pub use request::{RequestContext, RequestDescriptor};
pub use store::{CacheStore, MemoryStore, StoreError};
pub use whitelist::{WhitelistMatcher, WhitelistPatternError};
