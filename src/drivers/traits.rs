use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::types::LogWithLedger;

/// Driver errors
///
/// `Clone` so a single transport failure can be reported for every item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("not ready exporter")]
    NotReady,
    #[error("driver stopped")]
    Stopped,
    #[error("operation cancelled")]
    Cancelled,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("item rejected: {0}")]
    Rejected(String),
}

/// Per-item outcome of an `accept` call, positionally aligned with its input
pub type ItemResults = Vec<Result<(), DriverError>>;

/// Sink adapter contract
///
/// `accept` may be called concurrently by several pipelines sharing one exporter.
/// On success the returned vector has exactly one entry per submitted log.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open connections, create tables, ...
    async fn start(&self) -> Result<(), DriverError>;

    /// Release resources acquired by `start`
    async fn stop(&self) -> Result<(), DriverError>;

    /// Export logs, in order
    async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError>;
}

/// Typed configuration of a driver, decoded from an exporter's raw config
///
/// Both hooks are optional; the defaults do nothing.
pub trait DriverConfig: DeserializeOwned + Send + 'static {
    fn set_defaults(&mut self) {}

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
