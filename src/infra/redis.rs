//! Redis-backed [`CacheStore`].

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::info;

use crate::cache::{CacheStore, StoreError};

use super::error::InfraError;

const SCAN_BATCH: usize = 100;

/// Store client over one multiplexed Redis connection.
///
/// The connection is opened on first use, so an unreachable server at
/// startup degrades to cache misses instead of a boot failure. Every command
/// is bounded by `command_timeout`.
pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Validate `url` and prepare a lazily connected store.
    pub fn open(url: &str, command_timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::open(url).map_err(|err| {
            InfraError::configuration(format!("invalid cache store url: {err}"))
        })?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            command_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let manager = self
                    .bounded("connect", ConnectionManager::new(self.client.clone()))
                    .await?;
                info!(
                    target: "server_side_cache::store",
                    "connected to redis cache store"
                );
                Ok::<_, StoreError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    async fn bounded<T, F>(&self, op: &'static str, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_redis_error(op, err)),
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout_ms: self.command_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        self.bounded("get", conn.get::<_, Option<String>>(key)).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        ttl_seconds: u64,
        value: String,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        self.bounded("set", conn.set_ex::<_, _, ()>(key, value, ttl_seconds))
            .await
    }

    async fn scan_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", escape_glob(prefix));

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut command = redis::cmd("SCAN");
            command
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) = self
                .bounded("scan", command.query_async(&mut conn))
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may report a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        self.bounded("delete", conn.del::<_, ()>(key)).await
    }
}

fn map_redis_error(op: &'static str, err: RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        StoreError::unavailable(format!("{op}: {err}"))
    } else {
        StoreError::command(op, err.to_string())
    }
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prefix_is_unchanged() {
        assert_eq!(
            escape_glob("req_props:account_id:1/"),
            "req_props:account_id:1/"
        );
    }

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("a*b?c[d]e\\f"), "a\\*b\\?c\\[d\\]e\\\\f");
    }

    #[test]
    fn invalid_url_is_a_configuration_error() {
        let err = RedisStore::open("not a url", Duration::from_millis(100))
            .err()
            .expect("url should be rejected");
        assert!(matches!(err, InfraError::Configuration { .. }));
    }

    #[test]
    fn open_does_not_connect() {
        // Nothing listens on port 1; construction must still succeed.
        let store = RedisStore::open("redis://127.0.0.1:1/", Duration::from_millis(100))
            .expect("valid url");
        assert!(store.connection.get().is_none());
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_as_store_error() {
        let store = RedisStore::open("redis://127.0.0.1:1/", Duration::from_millis(200))
            .expect("valid url");
        let err = store.get("key").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unavailable { .. } | StoreError::Timeout { .. }
        ));
    }
}
