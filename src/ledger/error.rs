use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Exporter not found: {0}")]
    ExporterNotFound(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Ledger not found: {0}")]
    LedgerNotFound(String),

    #[error("Invalid ledger name: {0}")]
    InvalidLedgerName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExporterNotFound(_) | Self::PipelineNotFound(_) | Self::LedgerNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
