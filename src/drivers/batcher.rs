//! Batching decorator for drivers
//!
//! Every `accept` call enqueues its logs one operation at a time; a single
//! background worker commits queued operations in bulk and fans the
//! per-item outcome back to each waiting caller.
//!
//! A commit is triggered by whichever happens first:
//! - `max_items` operations are queued (when `max_items > 0`)
//! - `flush_interval` elapsed since the oldest queued operation (when non-zero)

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::batching::BatchingConfig;
use super::traits::{Driver, DriverError, ItemResults};
use super::types::LogWithLedger;

/// One enqueued log with its completion slot
struct Operation {
    log: LogWithLedger,
    done: oneshot::Sender<Result<(), DriverError>>,
}

enum WorkerSlot {
    Idle(mpsc::UnboundedReceiver<Operation>),
    Running {
        shutdown: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Driver wrapper committing independent `accept` calls together
///
/// `config` is expected to be validated (at least one bound set).
pub struct Batcher {
    driver: Arc<dyn Driver>,
    config: BatchingConfig,
    queue: mpsc::UnboundedSender<Operation>,
    worker: Mutex<WorkerSlot>,
}

impl Batcher {
    pub fn new(driver: Arc<dyn Driver>, config: BatchingConfig) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            driver,
            config,
            queue,
            worker: Mutex::new(WorkerSlot::Idle(receiver)),
        }
    }

    pub fn config(&self) -> BatchingConfig {
        self.config
    }

    async fn is_running(&self) -> bool {
        matches!(*self.worker.lock().await, WorkerSlot::Running { .. })
    }
}

#[async_trait]
impl Driver for Batcher {
    async fn start(&self) -> Result<(), DriverError> {
        self.driver.start().await?;

        let mut slot = self.worker.lock().await;
        match std::mem::replace(&mut *slot, WorkerSlot::Stopped) {
            WorkerSlot::Idle(receiver) => {
                let shutdown = CancellationToken::new();
                let handle = tokio::spawn(run_batcher(
                    self.driver.clone(),
                    self.config,
                    receiver,
                    shutdown.clone(),
                ));
                debug!(
                    max_items = self.config.max_items,
                    flush_interval = %self.config.flush_interval,
                    "Batcher started"
                );
                *slot = WorkerSlot::Running { shutdown, handle };
                Ok(())
            }
            running @ WorkerSlot::Running { .. } => {
                *slot = running;
                Ok(())
            }
            WorkerSlot::Stopped => Err(DriverError::Stopped),
        }
    }

    async fn stop(&self) -> Result<(), DriverError> {
        let slot = std::mem::replace(&mut *self.worker.lock().await, WorkerSlot::Stopped);
        if let WorkerSlot::Running { shutdown, handle } = slot {
            shutdown.cancel();
            if let Err(err) = handle.await {
                warn!(error = %err, "Batcher worker terminated abnormally");
            }
            debug!("Batcher drained");
        }

        self.driver.stop().await
    }

    async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
        if logs.is_empty() {
            return Ok(Vec::new());
        }
        if !self.is_running().await {
            return Err(DriverError::NotReady);
        }

        let mut waiters = Vec::with_capacity(logs.len());
        for log in logs {
            let (done, waiter) = oneshot::channel();
            self.queue
                .send(Operation { log, done })
                .map_err(|_| DriverError::Stopped)?;
            waiters.push(waiter);
        }

        let mut results = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            // A dropped completion slot means the worker exited without committing it
            results.push(waiter.await.unwrap_or(Err(DriverError::Stopped)));
        }

        Ok(results)
    }
}

async fn run_batcher(
    driver: Arc<dyn Driver>,
    config: BatchingConfig,
    mut receiver: mpsc::UnboundedReceiver<Operation>,
    shutdown: CancellationToken,
) {
    let mut pending: Vec<Operation> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                receiver.close();
                while let Some(operation) = receiver.recv().await {
                    pending.push(operation);
                }
                drain(driver.as_ref(), config, pending).await;
                return;
            }
            operation = receiver.recv() => {
                let Some(operation) = operation else {
                    drain(driver.as_ref(), config, pending).await;
                    return;
                };

                if pending.is_empty() && !config.flush_interval.is_zero() {
                    deadline = Some(Instant::now() + config.flush_interval.as_duration());
                }
                pending.push(operation);

                if config.max_items > 0 && pending.len() >= config.max_items {
                    commit(driver.as_ref(), std::mem::take(&mut pending)).await;
                    deadline = None;
                }
            }
            _ = flush_due(deadline) => {
                commit(driver.as_ref(), std::mem::take(&mut pending)).await;
                deadline = None;
            }
        }
    }
}

async fn flush_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Commit everything left, honouring the size bound
async fn drain(driver: &dyn Driver, config: BatchingConfig, mut pending: Vec<Operation>) {
    while !pending.is_empty() {
        let rest = if config.max_items > 0 && pending.len() > config.max_items {
            pending.split_off(config.max_items)
        } else {
            Vec::new()
        };
        commit(driver, pending).await;
        pending = rest;
    }
}

async fn commit(driver: &dyn Driver, batch: Vec<Operation>) {
    if batch.is_empty() {
        return;
    }

    let (logs, waiters): (Vec<_>, Vec<_>) = batch
        .into_iter()
        .map(|operation| (operation.log, operation.done))
        .unzip();
    let size = logs.len();
    debug!(size, "Committing batch");

    match driver.accept(logs).await {
        Ok(results) if results.len() == size => {
            for (done, result) in waiters.into_iter().zip(results) {
                let _ = done.send(result);
            }
        }
        Ok(results) => {
            let err = DriverError::Export(format!(
                "driver returned {} results for {} items",
                results.len(),
                size
            ));
            warn!(error = %err, "Inconsistent driver response");
            for done in waiters {
                let _ = done.send(Err(err.clone()));
            }
        }
        Err(err) => {
            warn!(size, error = %err, "Batch commit failed");
            for done in waiters {
                let _ = done.send(Err(err.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MockDriver;
    use crate::humanize::HumanDuration;
    use crate::models::Log;
    use serde_json::json;
    use std::time::Duration;

    fn item(id: u64) -> LogWithLedger {
        LogWithLedger::new("default", Log::new(id, "NEW_TRANSACTION", json!({})))
    }

    async fn started(driver: Arc<MockDriver>, config: BatchingConfig) -> Arc<Batcher> {
        let batcher = Arc::new(Batcher::new(driver, config));
        batcher.start().await.unwrap();
        batcher
    }

    #[tokio::test]
    async fn test_accept_before_start_is_rejected() {
        let batcher = Batcher::new(Arc::new(MockDriver::new()), BatchingConfig::new(1, HumanDuration::ZERO));
        let result = batcher.accept(vec![item(1)]).await;
        assert_eq!(result.unwrap_err(), DriverError::NotReady);
    }

    #[tokio::test]
    async fn test_commits_on_max_items() {
        let driver = Arc::new(MockDriver::new());
        let batcher = started(driver.clone(), BatchingConfig::new(3, HumanDuration::from_millis(50))).await;

        let results = batcher
            .accept((1..=5).map(item).collect())
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.is_ok()));

        let batches = driver.accepted_batches();
        assert!(batches.len() >= 2, "expected at least 2 commits, got {}", batches.len());
        assert_eq!(batches[0].iter().map(|l| l.id()).collect::<Vec<_>>(), vec![1, 2, 3]);
        let ids: Vec<u64> = batches.iter().flatten().map(|l| l.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_commits_on_flush_interval() {
        let driver = Arc::new(MockDriver::new());
        let batcher = started(driver.clone(), BatchingConfig::new(0, HumanDuration::from_millis(20))).await;

        let results = batcher.accept(vec![item(1), item(2)]).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(driver.accepted_batches().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_a_commit() {
        let driver = Arc::new(MockDriver::new());
        let batcher = started(driver.clone(), BatchingConfig::new(0, HumanDuration::from_millis(100))).await;

        let first = tokio::spawn({
            let batcher = batcher.clone();
            async move { batcher.accept(vec![item(1)]).await }
        });
        let second = tokio::spawn({
            let batcher = batcher.clone();
            async move { batcher.accept(vec![item(2)]).await }
        });

        assert!(first.await.unwrap().unwrap()[0].is_ok());
        assert!(second.await.unwrap().unwrap()[0].is_ok());
        assert_eq!(driver.accepted_batches().len(), 1);
        assert_eq!(driver.accepted_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_per_item_errors_are_isolated() {
        let driver = Arc::new(MockDriver::new());
        driver.reject_log(2);
        let batcher = started(driver.clone(), BatchingConfig::new(3, HumanDuration::ZERO)).await;

        let results = batcher.accept(vec![item(1), item(2), item(3)]).await.unwrap();

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DriverError::Rejected(_))));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_rejection_reaches_only_its_caller() {
        let driver = Arc::new(MockDriver::new());
        driver.reject_log(2);
        // Size-only batching: the commit waits for both callers
        let batcher = started(driver.clone(), BatchingConfig::new(2, HumanDuration::ZERO)).await;

        let first = tokio::spawn({
            let batcher = batcher.clone();
            async move { batcher.accept(vec![item(1)]).await }
        });
        let second = tokio::spawn({
            let batcher = batcher.clone();
            async move { batcher.accept(vec![item(2)]).await }
        });

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(driver.accept_count(), 1);
        assert_eq!(first.len(), 1);
        assert!(first[0].is_ok());
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], Err(DriverError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_call_error_fails_every_item() {
        let driver = Arc::new(MockDriver::new());
        driver.fail_next_accepts(1);
        let batcher = started(driver.clone(), BatchingConfig::new(2, HumanDuration::ZERO)).await;

        let results = batcher.accept(vec![item(1), item(2)]).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(DriverError::Export(_)))));
    }

    #[tokio::test]
    async fn test_stop_drains_pending_operations() {
        let driver = Arc::new(MockDriver::new());
        let batcher = started(driver.clone(), BatchingConfig::new(10, HumanDuration::ZERO)).await;

        let waiter = tokio::spawn({
            let batcher = batcher.clone();
            async move { batcher.accept(vec![item(1), item(2)]).await }
        });

        // Let the operations reach the queue; they cannot fill a batch of 10
        tokio::time::sleep(Duration::from_millis(20)).await;
        batcher.stop().await.unwrap();

        let results = waiter.await.unwrap().unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(driver.accepted_ids(), vec![1, 2]);
        assert_eq!(driver.stop_count(), 1);

        let after_stop = batcher.accept(vec![item(3)]).await;
        assert!(after_stop.is_err());
    }
}
