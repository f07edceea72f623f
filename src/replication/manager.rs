//! Reconciling orchestrator
//!
//! The [`Manager`] keeps the running pipelines in line with the enabled
//! pipelines in storage and serves every lifecycle mutation. One lock guards
//! the running pipelines, the shared driver facades, and every transition.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::error::ReplicationError;
use super::facade::DriverFacade;
use super::pipeline::{PipelineEvent, PipelineHandler, PipelineOptions};
use super::storage::Storage;
use crate::config::ReplicationConfig;
use crate::drivers::{
    BatchingDriverFactory, ConfigValidator, DriverFactory, DriverRegistry, RegistryFactory,
};
use crate::models::{
    Exporter, ExporterConfiguration, Pipeline, PipelineConfiguration, PipelineUpdate,
};
use crate::observability::Metrics;

pub type Result<T> = std::result::Result<T, ReplicationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub sync_period: Duration,
    pub driver_retry_interval: Duration,
    pub pipeline: PipelineOptions,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&ReplicationConfig::default())
    }
}

impl From<&ReplicationConfig> for ManagerOptions {
    fn from(config: &ReplicationConfig) -> Self {
        Self {
            sync_period: config.sync_period.as_duration(),
            driver_retry_interval: config.driver_retry_interval.as_duration(),
            pipeline: PipelineOptions::from(&config.pipeline),
        }
    }
}

struct RunningPipeline {
    exporter_id: String,
    handler: Arc<PipelineHandler>,
    worker: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    pipelines: HashMap<String, RunningPipeline>,
    drivers: HashMap<String, Arc<DriverFacade>>,
}

type StopRequest = oneshot::Sender<()>;

struct Inner {
    storage: Arc<dyn Storage>,
    factory: Arc<dyn DriverFactory>,
    validator: Arc<dyn ConfigValidator>,
    options: ManagerOptions,
    metrics: Arc<Metrics>,
    state: Mutex<State>,
    stop_tx: mpsc::Sender<StopRequest>,
    stop_rx: Mutex<Option<mpsc::Receiver<StopRequest>>>,
    started: watch::Sender<bool>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

/// Cloneable handle to the replication manager
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

impl Manager {
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: Arc<dyn DriverFactory>,
        validator: Arc<dyn ConfigValidator>,
        options: ManagerOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (started, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                storage,
                factory,
                validator,
                options,
                metrics,
                state: Mutex::new(State::default()),
                stop_tx,
                stop_rx: Mutex::new(Some(stop_rx)),
                started,
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Wire a manager whose drivers come from `registry`, batched
    pub fn with_registry(
        storage: Arc<dyn Storage>,
        registry: Arc<DriverRegistry>,
        options: ManagerOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        let factory = BatchingDriverFactory::new(RegistryFactory::new(
            registry.clone(),
            storage.clone(),
        ));
        Self::new(storage, Arc::new(factory), registry, options, metrics)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.inner.metrics.clone()
    }

    /// Run `op` in its own task so dropping the caller does not abort it
    async fn detached<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Manager) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(op(self.clone())).await?
    }

    /// Fails once `run` has shut down; nothing may start pipelines afterwards
    fn ensure_running(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(ReplicationError::NotRunning);
        }
        Ok(())
    }

    // Exporters

    pub async fn create_exporter(&self, configuration: ExporterConfiguration) -> Result<Exporter> {
        self.inner
            .validator
            .validate_config(&configuration.driver, &configuration.config)
            .map_err(ReplicationError::InvalidConfiguration)?;

        let exporter = Exporter::new(configuration);
        self.inner.storage.create_exporter(&exporter).await?;

        info!(exporter = %exporter.id, driver = %exporter.driver, "Exporter created");
        Ok(exporter)
    }

    pub async fn get_exporter(&self, id: &str) -> Result<Exporter> {
        Ok(self.inner.storage.get_exporter(id).await?)
    }

    pub async fn list_exporters(&self) -> Result<Vec<Exporter>> {
        Ok(self.inner.storage.list_exporters().await?)
    }

    /// Replace an exporter's driver and config, restarting the pipelines using it
    pub async fn update_exporter(&self, id: &str, configuration: ExporterConfiguration) -> Result<()> {
        self.ensure_running()?;
        self.inner
            .validator
            .validate_config(&configuration.driver, &configuration.config)
            .map_err(ReplicationError::InvalidConfiguration)?;

        let id = id.to_string();
        self.detached(move |manager| async move {
            let mut state = manager.inner.state.lock().await;

            let mut exporter = manager.inner.storage.get_exporter(&id).await?;
            manager.stop_exporter_locked(&mut state, &id).await;

            exporter.driver = configuration.driver;
            exporter.config = configuration.config;
            manager.inner.storage.update_exporter(&exporter).await?;
            info!(exporter = %id, driver = %exporter.driver, "Exporter updated");

            manager.synchronize_locked(&mut state).await
        })
        .await
    }

    /// Delete an exporter and, with it, every pipeline bound to it
    pub async fn delete_exporter(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        self.inner.storage.get_exporter(id).await?;
        self.stop_exporter_locked(&mut state, id).await;
        self.inner.storage.delete_exporter(id).await?;

        info!(exporter = %id, "Exporter deleted");
        Ok(())
    }

    // Pipelines

    /// Persist a pipeline and try to start it right away
    ///
    /// A start failure is only logged; reconciliation retries it.
    pub async fn create_pipeline(&self, configuration: PipelineConfiguration) -> Result<Pipeline> {
        self.ensure_running()?;
        self.detached(move |manager| async move {
            let storage = &manager.inner.storage;
            storage.get_exporter(&configuration.exporter_id).await?;

            let pipeline = Pipeline::new(configuration);
            storage.create_pipeline(&pipeline).await?;
            info!(
                pipeline = %pipeline.id,
                ledger = %pipeline.ledger,
                exporter = %pipeline.exporter_id,
                "Pipeline created"
            );

            let mut state = manager.inner.state.lock().await;
            if let Err(err) = manager.start_pipeline_locked(&mut state, &pipeline).await {
                error!(pipeline = %pipeline.id, error = %err, "Failed to start pipeline");
            }

            Ok(pipeline)
        })
        .await
    }

    pub async fn get_pipeline(&self, id: &str) -> Result<Pipeline> {
        Ok(self.inner.storage.get_pipeline(id).await?)
    }

    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        Ok(self.inner.storage.list_pipelines().await?)
    }

    pub async fn start_pipeline(&self, id: &str) -> Result<()> {
        self.ensure_running()?;
        let id = id.to_string();
        self.detached(move |manager| async move {
            let mut state = manager.inner.state.lock().await;
            if state.pipelines.contains_key(&id) {
                return Err(ReplicationError::AlreadyStarted(id));
            }

            let pipeline = manager.inner.storage.get_pipeline(&id).await?;
            manager.start_pipeline_locked(&mut state, &pipeline).await
        })
        .await
    }

    /// Stop the running handler; the persisted `enabled` flag is left untouched
    pub async fn stop_pipeline(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !state.pipelines.contains_key(id) {
            self.inner.storage.get_pipeline(id).await?;
            return Err(ReplicationError::NotStarted(id.to_string()));
        }

        self.stop_pipeline_locked(&mut state, id).await
    }

    /// Clear the checkpoint and re-enable; restart if it was running
    pub async fn reset_pipeline(&self, id: &str) -> Result<()> {
        self.ensure_running()?;
        let id = id.to_string();
        self.detached(move |manager| async move {
            let mut state = manager.inner.state.lock().await;
            manager.inner.storage.get_pipeline(&id).await?;

            let was_running = state.pipelines.contains_key(&id);
            if was_running {
                manager.stop_pipeline_locked(&mut state, &id).await?;
            }

            let pipeline = manager
                .inner
                .storage
                .update_pipeline(&id, PipelineUpdate::reset())
                .await?;
            info!(pipeline = %id, "Pipeline reset");

            if was_running {
                manager.start_pipeline_locked(&mut state, &pipeline).await?;
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_pipeline(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.inner.storage.get_pipeline(id).await?;

        if state.pipelines.contains_key(id) {
            self.stop_pipeline_locked(&mut state, id).await?;
        }
        self.inner.storage.delete_pipeline(id).await?;

        info!(pipeline = %id, "Pipeline deleted");
        Ok(())
    }

    // Runtime state

    /// Shared driver facade of an exporter, if one of its pipelines runs
    pub async fn get_driver(&self, exporter_id: &str) -> Option<Arc<DriverFacade>> {
        self.inner.state.lock().await.drivers.get(exporter_id).cloned()
    }

    /// Ids of pipelines with a live handler, sorted
    pub async fn running_pipelines(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut ids: Vec<String> = state.pipelines.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolves once `run` has completed its initial synchronization
    pub async fn started(&self) {
        let mut started = self.inner.started.subscribe();
        let _ = started.wait_for(|started| *started).await;
    }

    /// Align running handlers with the enabled pipelines in storage
    pub async fn synchronize(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        self.synchronize_locked(&mut state).await
    }

    async fn synchronize_locked(&self, state: &mut State) -> Result<()> {
        self.ensure_running()?;
        let enabled = self.inner.storage.list_enabled_pipelines().await?;
        let enabled_ids: HashSet<&str> = enabled.iter().map(|p| p.id.as_str()).collect();

        for pipeline in &enabled {
            if state.pipelines.contains_key(&pipeline.id) {
                continue;
            }
            if let Err(err) = self.start_pipeline_locked(state, pipeline).await {
                warn!(pipeline = %pipeline.id, error = %err, "Failed to start pipeline");
            }
        }

        let stale: Vec<String> = state
            .pipelines
            .keys()
            .filter(|id| !enabled_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Err(err) = self.stop_pipeline_locked(state, &id).await {
                warn!(pipeline = %id, error = %err, "Failed to stop pipeline");
            }
        }

        debug!(running = state.pipelines.len(), "Pipelines synchronized");
        Ok(())
    }

    async fn start_pipeline_locked(&self, state: &mut State, pipeline: &Pipeline) -> Result<()> {
        self.ensure_running()?;
        if state.pipelines.contains_key(&pipeline.id) {
            return Err(ReplicationError::AlreadyStarted(pipeline.id.clone()));
        }

        let driver = self.driver_locked(state, &pipeline.exporter_id).await?;
        let fetcher = match self.inner.storage.open_ledger(&pipeline.ledger).await {
            Ok((fetcher, _)) => fetcher,
            Err(err) => {
                self.release_driver_locked(state, &pipeline.exporter_id).await;
                return Err(err.into());
            }
        };

        let handler = Arc::new(PipelineHandler::new(
            pipeline.clone(),
            fetcher,
            driver,
            self.inner.options.pipeline,
            self.inner.metrics.clone(),
        ));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let worker = self.inner.tasks.spawn({
            let handler = handler.clone();
            let cancel = self.inner.cancel.child_token();
            async move { handler.run(events_tx, cancel).await }
        });
        let forwarder = self.inner.tasks.spawn(forward_events(
            self.inner.storage.clone(),
            pipeline.id.clone(),
            events_rx,
            self.inner.metrics.clone(),
        ));

        state.pipelines.insert(
            pipeline.id.clone(),
            RunningPipeline {
                exporter_id: pipeline.exporter_id.clone(),
                handler,
                worker,
                forwarder,
            },
        );
        self.inner.metrics.pipeline_started();
        Ok(())
    }

    async fn stop_pipeline_locked(&self, state: &mut State, id: &str) -> Result<()> {
        let running = state
            .pipelines
            .remove(id)
            .ok_or_else(|| ReplicationError::NotStarted(id.to_string()))?;

        running.handler.shutdown().await;
        if let Err(err) = running.worker.await {
            warn!(pipeline = %id, error = %err, "Pipeline worker terminated abnormally");
        }
        // Drained so no stale checkpoint lands after this point
        if let Err(err) = running.forwarder.await {
            warn!(pipeline = %id, error = %err, "Checkpoint forwarder terminated abnormally");
        }
        self.inner.metrics.pipeline_stopped();

        self.release_driver_locked(state, &running.exporter_id).await;
        Ok(())
    }

    /// Shared facade of an exporter, created and started on first use
    async fn driver_locked(&self, state: &mut State, exporter_id: &str) -> Result<Arc<DriverFacade>> {
        if let Some(facade) = state.drivers.get(exporter_id) {
            return Ok(facade.clone());
        }

        let (driver, _) = self.inner.factory.create(exporter_id).await?;
        let facade = Arc::new(DriverFacade::new(
            driver,
            self.inner.options.driver_retry_interval,
        ));
        facade.run().await;

        info!(exporter = %exporter_id, "Driver created");
        state.drivers.insert(exporter_id.to_string(), facade.clone());
        Ok(facade)
    }

    /// Stop an exporter's facade once no running pipeline references it
    async fn release_driver_locked(&self, state: &mut State, exporter_id: &str) {
        if state.pipelines.values().any(|p| p.exporter_id == exporter_id) {
            return;
        }
        if let Some(facade) = state.drivers.remove(exporter_id) {
            if let Err(err) = facade.stop().await {
                warn!(exporter = %exporter_id, error = %err, "Failed to stop driver");
            }
            info!(exporter = %exporter_id, "Driver stopped");
        }
    }

    /// Stop every pipeline of an exporter, then its facade
    async fn stop_exporter_locked(&self, state: &mut State, exporter_id: &str) {
        let ids: Vec<String> = state
            .pipelines
            .iter()
            .filter(|(_, running)| running.exporter_id == exporter_id)
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            if let Err(err) = self.stop_pipeline_locked(state, &id).await {
                warn!(pipeline = %id, error = %err, "Failed to stop pipeline");
            }
        }
        self.release_driver_locked(state, exporter_id).await;
    }

    // Lifecycle

    /// Reconcile once, signal `started`, then reconcile every sync period until stopped
    pub async fn run(&self) -> Result<()> {
        let Some(mut stop_rx) = self.inner.stop_rx.lock().await.take() else {
            return Err(ReplicationError::AlreadyRunning);
        };

        if let Err(err) = self.synchronize().await {
            error!(error = %err, "Initial synchronization failed");
        }
        self.inner.started.send_replace(true);
        info!(sync_period = ?self.inner.options.sync_period, "Manager started");

        let mut ticker = tokio::time::interval(self.inner.options.sync_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                request = stop_rx.recv() => {
                    self.shutdown().await;
                    if let Some(ack) = request {
                        let _ = ack.send(());
                    }
                    info!("Manager stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.synchronize().await {
                        error!(error = %err, "Synchronization failed");
                    }
                }
            }
        }
    }

    /// Ask `run` to stop every pipeline and wait for its acknowledgement
    ///
    /// Bound the wait with `tokio::time::timeout`; the shutdown itself continues regardless.
    pub async fn stop(&self) -> Result<()> {
        if self.inner.stop_rx.lock().await.is_some() {
            return Err(ReplicationError::NotRunning);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.stop_tx.send(ack_tx).await.is_err() {
            // `run` already returned
            return Ok(());
        }
        let _ = ack_rx.await;
        Ok(())
    }

    async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().await;
            let ids: Vec<String> = state.pipelines.keys().cloned().collect();
            for id in ids {
                if let Err(err) = self.stop_pipeline_locked(&mut state, &id).await {
                    warn!(pipeline = %id, error = %err, "Failed to stop pipeline");
                }
            }
            for (exporter_id, facade) in state.drivers.drain() {
                if let Err(err) = facade.stop().await {
                    warn!(exporter = %exporter_id, error = %err, "Failed to stop driver");
                }
            }
            // Under the lock, so no start can slip in between
            self.inner.cancel.cancel();
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

/// Persist what a pipeline handler reports, until its sender is dropped
async fn forward_events(
    storage: Arc<dyn Storage>,
    pipeline_id: String,
    mut events: mpsc::UnboundedReceiver<PipelineEvent>,
    metrics: Arc<Metrics>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::Checkpoint(last_log_id) => {
                match storage.store_pipeline_state(&pipeline_id, last_log_id).await {
                    Ok(()) => metrics.checkpoint_stored(),
                    Err(err) => {
                        error!(pipeline = %pipeline_id, last_log_id, error = %err, "Failed to store checkpoint")
                    }
                }
            }
            PipelineEvent::Failure(message) => {
                let update = PipelineUpdate::error(Some(message));
                if let Err(err) = storage.update_pipeline(&pipeline_id, update).await {
                    warn!(pipeline = %pipeline_id, error = %err, "Failed to record pipeline error");
                }
            }
        }
    }
}
