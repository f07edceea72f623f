use std::net::SocketAddr;
use std::sync::Arc;

use ledgerflow::api::{self, AppState};
use ledgerflow::config::Config;
use ledgerflow::drivers::DriverRegistry;
use ledgerflow::ledger::FjallStore;
use ledgerflow::observability::Metrics;
use ledgerflow::replication::{
    GlobalExporterOptions, GlobalExporterRunner, Manager, ManagerOptions,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let store = FjallStore::open(&config.server.fjall_path)?;
    let registry = Arc::new(DriverRegistry::with_defaults());
    let metrics = Arc::new(Metrics::new());

    // Built before anything runs so a bad driver config fails startup
    let global_exporter = match &config.replication.global_exporter {
        Some(global) => {
            let driver = registry.create_batched_driver(&global.driver, &global.config)?;
            info!(driver = %global.driver, "Global exporter enabled");
            Some(Arc::new(GlobalExporterRunner::new(
                Arc::new(store.clone()),
                driver,
                GlobalExporterOptions::from(global),
                metrics.clone(),
            )))
        }
        None => None,
    };

    let manager = Manager::with_registry(
        Arc::new(store.clone()),
        registry,
        ManagerOptions::from(&config.replication),
        metrics,
    );

    let replication = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });
    manager.started().await;

    let global_task = global_exporter.clone().map(|runner| {
        tokio::spawn(async move { runner.run(CancellationToken::new()).await })
    });

    let app = api::router(AppState::new(manager.clone(), store.clone()));

    let address = address.unwrap_or(config.server.bind_addr);
    let listener = TcpListener::bind(address).await?;
    info!(%address, "ledgerflow server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stop_timeout = config.replication.stop_timeout.as_duration();
    match tokio::time::timeout(stop_timeout, manager.stop()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Manager stop failed"),
        Err(_) => warn!(timeout = ?stop_timeout, "Manager did not stop in time"),
    }
    if let Some(runner) = &global_exporter {
        if tokio::time::timeout(stop_timeout, runner.shutdown()).await.is_err() {
            warn!(timeout = ?stop_timeout, "Global exporter did not stop in time");
        }
    }
    if let Some(task) = global_task {
        if task.is_finished() {
            if let Err(err) = task.await {
                error!(error = %err, "Global exporter task panicked");
            }
        }
    }
    if replication.is_finished() {
        if let Err(err) = replication.await? {
            error!(error = %err, "Replication manager exited with an error");
        }
    }

    store.persist()?;
    info!("ledgerflow server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
