//! Tokio runtime statistics.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics::Scope;

/// Point-in-time view of the current runtime.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub workers: usize,
    pub alive_tasks: usize,
    pub global_queue_depth: usize,
}

impl RuntimeSnapshot {
    /// Capture the runtime the caller runs on. Panics outside a runtime.
    pub fn capture() -> Self {
        let metrics = tokio::runtime::Handle::current().metrics();
        Self {
            workers: metrics.num_workers(),
            alive_tasks: metrics.num_alive_tasks(),
            global_queue_depth: metrics.global_queue_depth(),
        }
    }

    pub fn report(&self, scope: &Scope) {
        scope.gauge("workers").set(self.workers as f64);
        scope.gauge("alive_tasks").set(self.alive_tasks as f64);
        scope.gauge("global_queue_depth").set(self.global_queue_depth as f64);
    }
}

/// Publish a snapshot under `scope` every `interval` until `stop` fires.
pub fn spawn_collector(scope: Scope, interval: Duration, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => RuntimeSnapshot::capture().report(&scope),
                _ = stop.cancelled() => break,
            }
        }
        tracing::debug!("Runtime stats collector stopped");
    })
}
