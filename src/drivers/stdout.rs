use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use super::traits::{Driver, DriverConfig, DriverError, ItemResults};
use super::types::LogWithLedger;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdoutConfig {
    #[serde(default)]
    pub pretty: bool,
}

impl DriverConfig for StdoutConfig {}

/// Driver writing each log as JSON to standard output
#[derive(Debug, Clone, Default)]
pub struct StdoutDriver {
    config: StdoutConfig,
}

impl StdoutDriver {
    pub fn new(config: StdoutConfig) -> Self {
        Self { config }
    }

    fn render(&self, log: &LogWithLedger) -> Result<String, DriverError> {
        let rendered = if self.config.pretty {
            serde_json::to_string_pretty(log)
        } else {
            serde_json::to_string(log)
        };
        rendered.map_err(|e| DriverError::Rejected(e.to_string()))
    }
}

#[async_trait]
impl Driver for StdoutDriver {
    async fn start(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
        let mut buffer = String::new();
        let mut results = Vec::with_capacity(logs.len());

        for log in &logs {
            match self.render(log) {
                Ok(line) => {
                    buffer.push_str(&line);
                    buffer.push('\n');
                    results.push(Ok(()));
                }
                Err(err) => results.push(Err(err)),
            }
        }

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(buffer.as_bytes())
            .await
            .map_err(|e| DriverError::Export(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| DriverError::Export(e.to_string()))?;

        Ok(results)
    }
}
