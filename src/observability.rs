//! Observability: replication counters and tracing setup

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Metrics handle shared by the manager and every pipeline
#[derive(Debug, Default)]
pub struct Metrics {
    logs_exported: AtomicU64,
    push_failures: AtomicU64,
    fetch_failures: AtomicU64,
    checkpoints_stored: AtomicU64,
    pipelines_started: AtomicU64,
    pipelines_stopped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs_exported(&self, count: usize) {
        self.logs_exported.fetch_add(count as u64, Ordering::Relaxed);
        tracing::trace!(counter = "logs_exported", count, "Metric incremented");
    }

    pub fn push_failed(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "push_failures", "Metric incremented");
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "fetch_failures", "Metric incremented");
    }

    pub fn checkpoint_stored(&self) {
        self.checkpoints_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pipeline_started(&self) {
        self.pipelines_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "pipelines_started", "Metric incremented");
    }

    pub fn pipeline_stopped(&self) {
        self.pipelines_stopped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "pipelines_stopped", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            logs_exported: self.logs_exported.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            checkpoints_stored: self.checkpoints_stored.load(Ordering::Relaxed),
            pipelines_started: self.pipelines_started.load(Ordering::Relaxed),
            pipelines_stopped: self.pipelines_stopped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub logs_exported: u64,
    pub push_failures: u64,
    pub fetch_failures: u64,
    pub checkpoints_stored: u64,
    pub pipelines_started: u64,
    pub pipelines_stopped: u64,
}

/// Install the global fmt subscriber; `RUST_LOG` takes precedence over `default_filter`
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A second initialisation (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.logs_exported(5);
        metrics.logs_exported(2);
        metrics.push_failed();
        metrics.pipeline_started();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.logs_exported, 7);
        assert_eq!(snapshot.push_failures, 1);
        assert_eq!(snapshot.pipelines_started, 1);
        assert_eq!(snapshot.fetch_failures, 0);
    }
}
