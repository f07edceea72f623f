use thiserror::Error;

use crate::drivers::RegistryError;
use crate::ledger::StoreError;

/// Domain errors of manager operations
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("exporter not found: {0}")]
    ExporterNotFound(String),

    #[error("ledger not found: {0}")]
    LedgerNotFound(String),

    #[error("pipeline already started: {0}")]
    AlreadyStarted(String),

    #[error("pipeline not started: {0}")]
    NotStarted(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[source] RegistryError),

    #[error("driver error: {0}")]
    Registry(#[source] RegistryError),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("manager is already running")]
    AlreadyRunning,

    #[error("manager is not running")]
    NotRunning,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PipelineNotFound(_) | Self::ExporterNotFound(_) | Self::LedgerNotFound(_)
        )
    }
}

impl From<StoreError> for ReplicationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PipelineNotFound(id) => Self::PipelineNotFound(id),
            StoreError::ExporterNotFound(id) => Self::ExporterNotFound(id),
            StoreError::LedgerNotFound(name) => Self::LedgerNotFound(name),
            other => Self::Storage(other),
        }
    }
}

impl From<RegistryError> for ReplicationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ExporterNotFound(id) => Self::ExporterNotFound(id),
            RegistryError::Storage(err) => err.into(),
            other => Self::Registry(other),
        }
    }
}

impl From<tokio::task::JoinError> for ReplicationError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}
