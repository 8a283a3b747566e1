use std::sync::Arc;

use tracing::info;

use crate::{
    cache::{CacheStore, MemoryStore},
    config::CacheSettings,
};

use super::{error::InfraError, redis::RedisStore};

/// Build the store selected by `cache.store_url`.
pub fn open_store(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>, InfraError> {
    if settings.uses_memory_store() {
        info!(
            target: "server_side_cache::store",
            "using in-process cache store"
        );
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = RedisStore::open(&settings.store_url, settings.command_timeout)?;
    info!(
        target: "server_side_cache::store",
        timeout_ms = settings.command_timeout.as_millis() as u64,
        "using redis cache store"
    );
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use std::{
        num::{NonZeroU64, NonZeroUsize},
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tracing::{Event, Subscriber};
    use tracing_subscriber::{
        layer::{Context, Layer, SubscriberExt},
        registry,
    };

    use super::*;
    use crate::config::RouteCacheSettings;

    #[derive(Clone, Default)]
    struct TargetRecorder(Arc<Mutex<Vec<String>>>);

    impl<S: Subscriber> Layer<S> for TargetRecorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0
                .lock()
                .unwrap()
                .push(event.metadata().target().to_string());
        }
    }

    fn settings(store_url: &str) -> CacheSettings {
        CacheSettings {
            store_url: store_url.to_string(),
            ttl_seconds: NonZeroU64::new(60).unwrap(),
            command_timeout: Duration::from_millis(100),
            max_body_bytes: NonZeroUsize::new(1024).unwrap(),
            route: RouteCacheSettings::default(),
        }
    }

    #[test]
    fn store_selection_logs_under_store_target() {
        let recorder = TargetRecorder::default();
        let subscriber = registry().with(recorder.clone());

        tracing::subscriber::with_default(subscriber, || {
            open_store(&settings("memory://")).expect("memory store");
            open_store(&settings("redis://127.0.0.1:1/")).expect("redis store");
        });

        let targets = recorder.0.lock().unwrap().clone();
        assert_eq!(
            targets,
            vec![
                "server_side_cache::store".to_string(),
                "server_side_cache::store".to_string()
            ]
        );
    }
}
