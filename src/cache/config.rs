//! Cache configuration.
//!
//! `CacheConfig` applies to one middleware instance (one store handle);
//! `RouteCacheConfig` selects key terms and exemptions per route group.

use serde::Deserialize;

use super::keys::KeyConfig;

const DEFAULT_TTL_SECONDS: u64 = 60;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime applied to every written entry.
    pub ttl_seconds: u64,
    /// Largest `GET` body that will be buffered and cached.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            ttl_seconds: settings.ttl_seconds.get(),
            max_body_bytes: settings.max_body_bytes.get(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RouteCacheConfig {
    pub key: KeyConfig,
    /// Path patterns whose `GET` responses are never cached.
    pub whitelist: Vec<String>,
}

impl RouteCacheConfig {
    pub fn new(key: KeyConfig, whitelist: Vec<String>) -> Self {
        Self { key, whitelist }
    }
}

impl From<&crate::config::RouteCacheSettings> for RouteCacheConfig {
    fn from(settings: &crate::config::RouteCacheSettings) -> Self {
        Self {
            key: KeyConfig::new(settings.properties.clone(), settings.headers.clone()),
            whitelist: settings.whitelist.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_seconds, 60);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn route_config_defaults_to_empty_key_and_whitelist() {
        let route = RouteCacheConfig::default();
        assert!(route.key.properties.is_empty());
        assert!(route.key.headers.is_empty());
        assert!(route.whitelist.is_empty());
    }
}
