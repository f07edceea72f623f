//! Catch-up exporter over every ledger
//!
//! The [`GlobalExporterRunner`] pushes the logs of all ledgers to a single
//! driver, independently of pipelines. Progress is kept per ledger in an
//! [`ExportStateStore`]; each pass drains every ledger page by page, then
//! waits a poll interval. A call-level push error retries the same batch;
//! per-log rejections are logged and the batch counts as delivered.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::facade::DriverFacade;
use super::pipeline::{Interrupt, StopRequest, interruptible};
use super::storage::{ExportStateStore, LogQuery};
use crate::config::GlobalExporterConfig;
use crate::drivers::{Driver, LogWithLedger};
use crate::observability::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalExporterOptions {
    /// Wait between two passes over the ledgers
    pub poll_interval: Duration,
    /// Wait after a failed push, also used between driver start attempts
    pub push_retry_period: Duration,
    pub logs_page_size: usize,
    /// Clear the stored progress before the first pass
    pub reset: bool,
}

impl Default for GlobalExporterOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            push_retry_period: Duration::from_secs(10),
            logs_page_size: 100,
            reset: false,
        }
    }
}

impl From<&GlobalExporterConfig> for GlobalExporterOptions {
    fn from(config: &GlobalExporterConfig) -> Self {
        Self {
            poll_interval: config.poll_interval.as_duration(),
            push_retry_period: config.push_retry_period.as_duration(),
            logs_page_size: config.logs_page_size,
            reset: config.reset,
        }
    }
}

pub struct GlobalExporterRunner {
    store: Arc<dyn ExportStateStore>,
    driver: Arc<dyn Driver>,
    options: GlobalExporterOptions,
    metrics: Arc<Metrics>,
    stop_tx: mpsc::Sender<StopRequest>,
    stop_rx: Mutex<Option<mpsc::Receiver<StopRequest>>>,
}

impl GlobalExporterRunner {
    pub fn new(
        store: Arc<dyn ExportStateStore>,
        driver: Arc<dyn Driver>,
        options: GlobalExporterOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        Self {
            store,
            driver,
            options,
            metrics,
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
        }
    }

    /// Export until shutdown or cancellation, then stop the driver
    ///
    /// Runs at most once; a second call returns immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(mut stop_rx) = self.stop_rx.lock().await.take() else {
            warn!("Global exporter already ran");
            return;
        };

        info!(
            poll_interval = ?self.options.poll_interval,
            page_size = self.options.logs_page_size,
            "Global exporter starting"
        );

        if self.options.reset {
            info!("Resetting global export state, every log will be exported again");
            if let Err(err) = self.store.clear_export_states().await {
                error!(error = %err, "Failed to reset global export state");
            }
        }

        let facade = DriverFacade::new(self.driver.clone(), self.options.push_retry_period);
        facade.run().await;

        let Err(interrupt) = self.export_loop(&facade, &mut stop_rx, &cancel).await;

        if let Err(err) = facade.stop().await {
            error!(error = %err, "Failed to stop global exporter driver");
        }

        match interrupt {
            Interrupt::Stop(ack) => {
                info!("Global exporter stopped");
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Interrupt::Cancelled => info!("Global exporter cancelled"),
        }
    }

    /// Request shutdown and wait until the driver is stopped
    ///
    /// Returns immediately when the runner already exited.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.stop_tx.send(ack_tx).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    async fn export_loop(
        &self,
        facade: &DriverFacade,
        stop_rx: &mut mpsc::Receiver<StopRequest>,
        cancel: &CancellationToken,
    ) -> Result<Infallible, Interrupt> {
        interruptible(stop_rx, cancel, facade.ready()).await?;
        info!("Global exporter driver ready");

        let mut wait = Duration::ZERO;
        loop {
            interruptible(stop_rx, cancel, tokio::time::sleep(wait)).await?;
            wait = self.options.poll_interval;

            let states = match self.store.list_export_states().await {
                Ok(states) => states,
                Err(err) => {
                    error!(error = %err, "Failed to list global export states");
                    continue;
                }
            };
            let ledgers = match self.store.ledgers().await {
                Ok(ledgers) => ledgers,
                Err(err) => {
                    error!(error = %err, "Failed to list ledgers");
                    continue;
                }
            };

            for ledger in ledgers {
                let after = states.get(&ledger.name).copied();
                self.export_ledger(facade, &ledger.name, after, stop_rx, cancel)
                    .await?;
            }
        }
    }

    /// Drain one ledger from `after`; storage errors end the ledger's turn for this pass
    async fn export_ledger(
        &self,
        facade: &DriverFacade,
        ledger: &str,
        mut after: Option<u64>,
        stop_rx: &mut mpsc::Receiver<StopRequest>,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupt> {
        let fetcher = match self.store.open_ledger(ledger).await {
            Ok((fetcher, _)) => fetcher,
            Err(err) => {
                error!(ledger, error = %err, "Failed to open ledger");
                return Ok(());
            }
        };

        loop {
            let query = LogQuery::new(after, self.options.logs_page_size);
            let page = match interruptible(stop_rx, cancel, fetcher.list_logs(query)).await? {
                Ok(page) => page,
                Err(err) => {
                    error!(ledger, error = %err, "Failed to fetch logs");
                    self.metrics.fetch_failed();
                    return Ok(());
                }
            };

            let Some(last_id) = page.data.last().map(|log| log.id) else {
                return Ok(());
            };

            let batch: Vec<LogWithLedger> = page
                .data
                .into_iter()
                .map(|log| LogWithLedger::new(ledger, log))
                .collect();
            let count = batch.len();

            self.push(facade, ledger, batch, stop_rx, cancel).await?;

            if let Err(err) = self.store.store_export_state(ledger, last_id).await {
                error!(ledger, error = %err, "Failed to store global export state");
            }
            after = Some(last_id);
            self.metrics.logs_exported(count);
            debug!(ledger, last_id, count, "Logs exported globally");

            if !page.has_more {
                return Ok(());
            }
        }
    }

    async fn push(
        &self,
        facade: &DriverFacade,
        ledger: &str,
        batch: Vec<LogWithLedger>,
        stop_rx: &mut mpsc::Receiver<StopRequest>,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupt> {
        loop {
            match interruptible(stop_rx, cancel, facade.accept(batch.clone())).await? {
                Ok(results) => {
                    let rejected = results.iter().filter(|r| r.is_err()).count();
                    if rejected > 0 {
                        warn!(ledger, rejected, count = batch.len(), "Driver rejected logs");
                    }
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        ledger,
                        error = %err,
                        retry_in = ?self.options.push_retry_period,
                        "Failed to push logs"
                    );
                    self.metrics.push_failed();
                }
            }

            interruptible(
                stop_rx,
                cancel,
                tokio::time::sleep(self.options.push_retry_period),
            )
            .await?;
        }
    }
}
