use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{Driver, DriverConfig, DriverError, ItemResults};
use super::types::LogWithLedger;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoopConfig {}

impl DriverConfig for NoopConfig {}

/// Driver discarding every log
#[derive(Debug, Clone, Default)]
pub struct NoopDriver;

impl NoopDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for NoopDriver {
    async fn start(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
        tracing::trace!(count = logs.len(), "Noop accept");
        Ok(vec![Ok(()); logs.len()])
    }
}
