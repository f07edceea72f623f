use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            fjall_path: default_fjall_path(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/ledgerflow")
}

/// Manager and driver lifecycle settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicationConfig {
    /// Period of the reconciliation loop
    #[serde(default = "default_sync_period")]
    pub sync_period: HumanDuration,
    /// Wait between two failed driver starts
    #[serde(default = "default_driver_retry_interval")]
    pub driver_retry_interval: HumanDuration,
    /// Upper bound for a graceful shutdown
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: HumanDuration,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Exports every ledger to one driver; disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_exporter: Option<GlobalExporterConfig>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            sync_period: default_sync_period(),
            driver_retry_interval: default_driver_retry_interval(),
            stop_timeout: default_stop_timeout(),
            pipeline: PipelineConfig::default(),
            global_exporter: None,
        }
    }
}

fn default_sync_period() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_driver_retry_interval() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_stop_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

/// Export loop settings shared by every pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_period")]
    pub pull_interval: HumanDuration,
    #[serde(default = "default_pipeline_period")]
    pub pull_retry_period: HumanDuration,
    #[serde(default = "default_pipeline_period")]
    pub push_retry_period: HumanDuration,
    #[serde(default = "default_logs_page_size")]
    pub logs_page_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pull_interval: default_pipeline_period(),
            pull_retry_period: default_pipeline_period(),
            push_retry_period: default_pipeline_period(),
            logs_page_size: default_logs_page_size(),
        }
    }
}

fn default_pipeline_period() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_logs_page_size() -> usize {
    100
}

/// Catch-up exporter following every ledger
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalExporterConfig {
    /// Registered driver name
    pub driver: String,
    /// Driver configuration, `batching` included
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default = "default_global_poll_interval")]
    pub poll_interval: HumanDuration,
    #[serde(default = "default_pipeline_period")]
    pub push_retry_period: HumanDuration,
    #[serde(default = "default_logs_page_size")]
    pub logs_page_size: usize,
    /// Drop the stored progress on start and export everything again
    #[serde(default)]
    pub reset: bool,
}

impl GlobalExporterConfig {
    pub fn new(driver: impl Into<String>, config: Value) -> Self {
        Self {
            driver: driver.into(),
            config,
            poll_interval: default_global_poll_interval(),
            push_retry_period: default_pipeline_period(),
            logs_page_size: default_logs_page_size(),
            reset: false,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_global_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(1)
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Default `tracing` filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
