//! Fire-and-forget cache writes and invalidations.
//!
//! Tasks run detached from the request that spawned them: the pipeline never
//! awaits them, failures are logged by the task itself and never retried,
//! and no ordering is guaranteed relative to later requests. Handles are
//! kept so shutdown can wait for in-flight work.

use std::{future::Future, sync::Mutex};

use tokio::task::JoinSet;
use tracing::warn;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::background";

#[derive(Default)]
pub struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime without awaiting it.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = mutex_lock(&self.tasks, SOURCE, "spawn");
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Tasks spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        mutex_lock(&self.tasks, SOURCE, "pending").len()
    }

    /// Wait for every task spawned before this call.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *mutex_lock(&self.tasks, SOURCE, "drain"));
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                warn!(
                    target: "server_side_cache::cache",
                    error = %err,
                    "background cache task did not complete"
                );
            }
        }
    }
}
