//! HTTP driver: POSTs every batch as a JSON array

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::traits::{Driver, DriverConfig, DriverError, ItemResults};
use super::types::LogWithLedger;
use crate::humanize::HumanDuration;

pub const DEFAULT_TIMEOUT: HumanDuration = HumanDuration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpDriverConfig {
    pub url: String,
    #[serde(default)]
    pub timeout: HumanDuration,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl DriverConfig for HttpDriverConfig {
    fn set_defaults(&mut self) {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
    }

    fn validate(&self) -> Result<(), String> {
        let url = Url::parse(&self.url).map_err(|e| format!("invalid url '{}': {}", self.url, e))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(format!("unsupported url scheme: {}", other)),
        }

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name {:?}: {}", name, e))?;
            HeaderValue::from_str(value)
                .map_err(|e| format!("invalid value for header {:?}: {}", name, e))?;
        }
        Ok(())
    }
}

/// Driver pushing logs to an HTTP endpoint
pub struct HttpDriver {
    client: Client,
    config: HttpDriverConfig,
}

impl HttpDriver {
    pub fn new(config: HttpDriverConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(config.timeout.as_duration())
            .user_agent(concat!("ledgerflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Driver for HttpDriver {
    async fn start(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn accept(&self, logs: Vec<LogWithLedger>) -> Result<ItemResults, DriverError> {
        debug!(url = %self.config.url, count = logs.len(), "Posting logs");

        let mut request = self.client.post(&self.config.url).json(&logs);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DriverError::Connection("request timed out".to_string())
            } else if e.is_connect() {
                DriverError::Connection(e.to_string())
            } else {
                DriverError::Export(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.config.url, status = status.as_u16(), "Endpoint rejected batch");
            return Err(DriverError::Export(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        Ok(vec![Ok(()); logs.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> HttpDriverConfig {
        let mut config: HttpDriverConfig = serde_json::from_value(value).unwrap();
        config.set_defaults();
        config
    }

    #[test]
    fn test_default_timeout() {
        let config = parse(json!({"url": "http://localhost:9000/logs"}));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_timeout_and_headers() {
        let config = parse(json!({
            "url": "https://sink.example/logs",
            "timeout": "5s",
            "headers": {"authorization": "Bearer x"}
        }));
        assert_eq!(config.timeout, HumanDuration::from_secs(5));
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(parse(json!({"url": "ftp://sink/logs"})).validate().is_err());
        assert!(parse(json!({"url": "not a url"})).validate().is_err());
    }

    #[test]
    fn test_rejects_invalid_headers() {
        let bad_name = parse(json!({
            "url": "http://localhost:1/x",
            "headers": {"bad header\n": "v"}
        }));
        assert!(bad_name.validate().unwrap_err().contains("header name"));

        let bad_value = parse(json!({
            "url": "http://localhost:1/x",
            "headers": {"x-token": "line\nbreak"}
        }));
        assert!(bad_value.validate().is_err());

        let registry = crate::drivers::DriverRegistry::with_defaults();
        let err = crate::drivers::ConfigValidator::validate_config(
            &registry,
            "http",
            &json!({"url": "http://localhost:1/x", "headers": {"bad header\n": "v"}}),
        )
        .unwrap_err();
        assert!(matches!(err, crate::drivers::RegistryError::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_the_call() {
        let driver = HttpDriver::new(parse(json!({
            "url": "http://127.0.0.1:1/logs",
            "timeout": "500ms"
        })))
        .unwrap();

        let result = driver
            .accept(vec![LogWithLedger::new(
                "default",
                crate::models::Log::new(1, "NEW_TRANSACTION", json!({})),
            )])
            .await;

        assert!(result.is_err());
    }
}
