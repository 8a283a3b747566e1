use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    cache::metric_names::{
        METRIC_CACHE_BYPASS, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATED_KEYS, METRIC_CACHE_MISS,
        METRIC_CACHE_STORE_ERROR, METRIC_CACHE_WRITE,
    },
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Cache-layer events use the `server_side_cache::cache` target, so
/// `RUST_LOG=server_side_cache::cache=debug` surfaces per-request outcomes.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for the cache metrics with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of GET requests served from the response cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cacheable GET requests that ran the handler."
        );
        describe_counter!(
            METRIC_CACHE_BYPASS,
            Unit::Count,
            "Total number of GET requests skipped because their path is whitelisted."
        );
        describe_counter!(
            METRIC_CACHE_WRITE,
            Unit::Count,
            "Total number of responses written to the cache store."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATED_KEYS,
            Unit::Count,
            "Total number of cache entries deleted by mutation invalidation."
        );
        describe_counter!(
            METRIC_CACHE_STORE_ERROR,
            Unit::Count,
            "Total number of failed cache store operations, labelled by op."
        );
    });
}
