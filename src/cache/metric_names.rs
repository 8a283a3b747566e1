//! Metric names emitted by the response cache.

pub const METRIC_CACHE_HIT: &str = "ssc_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "ssc_cache_miss_total";
pub const METRIC_CACHE_BYPASS: &str = "ssc_cache_bypass_total";
pub const METRIC_CACHE_WRITE: &str = "ssc_cache_write_total";
pub const METRIC_CACHE_INVALIDATED_KEYS: &str = "ssc_cache_invalidated_keys_total";
pub const METRIC_CACHE_STORE_ERROR: &str = "ssc_cache_store_error_total";
