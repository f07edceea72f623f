//! Per-pipeline export loop
//!
//! A [`PipelineHandler`] fetches logs after its checkpoint, pushes them to its
//! driver and reports every new checkpoint on an event channel. Fetch and push
//! failures are retried forever with fixed waits; only a shutdown request or
//! cancellation ends the loop.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::storage::{LogFetcher, LogQuery};
use crate::config::PipelineConfig;
use crate::drivers::{Driver, ItemResults, LogWithLedger};
use crate::models::Pipeline;
use crate::observability::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Wait after an empty fetch
    pub pull_interval: Duration,
    /// Wait after a failed fetch
    pub pull_retry_period: Duration,
    /// Wait after a failed push
    pub push_retry_period: Duration,
    pub logs_page_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            pull_interval: config.pull_interval.as_duration(),
            pull_retry_period: config.pull_retry_period.as_duration(),
            push_retry_period: config.push_retry_period.as_duration(),
            logs_page_size: config.logs_page_size,
        }
    }
}

/// Emitted by a running handler, consumed by the manager's forwarder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Every log up to this id has been exported
    Checkpoint(u64),
    /// A push attempt failed and will be retried
    Failure(String),
}

pub(super) type StopRequest = oneshot::Sender<()>;

/// Why a loop returned early
pub(super) enum Interrupt {
    Stop(Option<StopRequest>),
    Cancelled,
}

pub struct PipelineHandler {
    pipeline: Pipeline,
    fetcher: Arc<dyn LogFetcher>,
    driver: Arc<dyn Driver>,
    options: PipelineOptions,
    metrics: Arc<Metrics>,
    stop_tx: mpsc::Sender<StopRequest>,
    stop_rx: Mutex<Option<mpsc::Receiver<StopRequest>>>,
}

impl PipelineHandler {
    pub fn new(
        pipeline: Pipeline,
        fetcher: Arc<dyn LogFetcher>,
        driver: Arc<dyn Driver>,
        options: PipelineOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        Self {
            pipeline,
            fetcher,
            driver,
            options,
            metrics,
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run the export loop until shutdown or cancellation
    ///
    /// A handler runs at most once; a second call returns immediately.
    pub async fn run(&self, events: mpsc::UnboundedSender<PipelineEvent>, cancel: CancellationToken) {
        let Some(mut stop_rx) = self.stop_rx.lock().await.take() else {
            warn!(pipeline = %self.pipeline.id, "Pipeline handler already ran");
            return;
        };

        info!(
            pipeline = %self.pipeline.id,
            ledger = %self.pipeline.ledger,
            exporter = %self.pipeline.exporter_id,
            checkpoint = ?self.pipeline.last_log_id,
            "Pipeline started"
        );

        let Err(interrupt) = self.export_loop(&mut stop_rx, &cancel, &events).await;

        match interrupt {
            Interrupt::Stop(ack) => {
                info!(pipeline = %self.pipeline.id, "Pipeline stopped");
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Interrupt::Cancelled => {
                info!(pipeline = %self.pipeline.id, "Pipeline cancelled");
            }
        }
    }

    /// Request shutdown and wait for the loop to acknowledge it
    ///
    /// Returns immediately when the loop already exited.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.stop_tx.send(ack_tx).await.is_err() {
            return;
        }
        // A dropped acknowledgement also means the loop is gone
        let _ = ack_rx.await;
    }

    async fn export_loop(
        &self,
        stop_rx: &mut mpsc::Receiver<StopRequest>,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<Infallible, Interrupt> {
        let mut checkpoint = self.pipeline.last_log_id;
        let mut wait = Duration::ZERO;

        loop {
            interruptible(stop_rx, cancel, tokio::time::sleep(wait)).await?;

            let query = LogQuery::new(checkpoint, self.options.logs_page_size);
            let page = match interruptible(stop_rx, cancel, self.fetcher.list_logs(query)).await? {
                Ok(page) => page,
                Err(err) => {
                    error!(pipeline = %self.pipeline.id, error = %err, "Failed to fetch logs");
                    self.metrics.fetch_failed();
                    wait = self.options.pull_retry_period;
                    continue;
                }
            };

            let Some(last_id) = page.data.last().map(|log| log.id) else {
                debug!(pipeline = %self.pipeline.id, "No new logs");
                wait = self.options.pull_interval;
                continue;
            };

            let batch: Vec<LogWithLedger> = page
                .data
                .into_iter()
                .map(|log| LogWithLedger::new(self.pipeline.ledger.clone(), log))
                .collect();
            let count = batch.len();

            self.push(batch, stop_rx, cancel, events).await?;

            checkpoint = Some(last_id);
            self.metrics.logs_exported(count);
            debug!(pipeline = %self.pipeline.id, checkpoint = last_id, count, "Logs exported");
            let _ = events.send(PipelineEvent::Checkpoint(last_id));

            wait = if page.has_more {
                Duration::ZERO
            } else {
                self.options.pull_interval
            };
        }
    }

    /// Push the same batch until it is accepted
    async fn push(
        &self,
        batch: Vec<LogWithLedger>,
        stop_rx: &mut mpsc::Receiver<StopRequest>,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<(), Interrupt> {
        loop {
            let outcome =
                interruptible(stop_rx, cancel, self.driver.accept(batch.clone())).await?;

            let failure = match outcome {
                Ok(results) => match first_failure(&results, batch.len()) {
                    None => return Ok(()),
                    Some(failure) => failure,
                },
                Err(err) => err.to_string(),
            };

            warn!(
                pipeline = %self.pipeline.id,
                error = %failure,
                retry_in = ?self.options.push_retry_period,
                "Failed to push logs"
            );
            self.metrics.push_failed();
            let _ = events.send(PipelineEvent::Failure(failure));

            interruptible(
                stop_rx,
                cancel,
                tokio::time::sleep(self.options.push_retry_period),
            )
            .await?;
        }
    }
}

/// Any per-item error fails the whole push
fn first_failure(results: &ItemResults, expected: usize) -> Option<String> {
    if results.len() != expected {
        return Some(format!(
            "driver returned {} results for {} logs",
            results.len(),
            expected
        ));
    }

    let failed = results.iter().filter(|r| r.is_err()).count();
    let first = results.iter().find_map(|r| r.as_ref().err())?;
    Some(format!("{} of {} logs rejected: {}", failed, expected, first))
}

/// Await `future` unless a stop request or cancellation comes first
pub(super) async fn interruptible<F: Future>(
    stop_rx: &mut mpsc::Receiver<StopRequest>,
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        ack = stop_rx.recv() => Err(Interrupt::Stop(ack)),
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        output = future => Ok(output),
    }
}
