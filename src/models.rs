//! Domain models shared by storage, drivers and the replication engine.
//!
//! - [`Exporter`]: a configured instance of a sink driver
//! - [`Pipeline`]: binds one ledger's log stream to one exporter, with its checkpoint
//! - [`Log`]: an immutable, id-ordered entry of a ledger's change log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Input used to create or replace an exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfiguration {
    pub driver: String,
    #[serde(default = "empty_object")]
    pub config: Value,
}

impl ExporterConfiguration {
    pub fn new(driver: impl Into<String>, config: Value) -> Self {
        Self {
            driver: driver.into(),
            config,
        }
    }
}

/// A named, configured sink instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exporter {
    pub id: String,
    pub driver: String,
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

impl Exporter {
    pub fn new(configuration: ExporterConfiguration) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            driver: configuration.driver,
            config: configuration.config,
            created_at: Utc::now(),
        }
    }
}

/// Input used to create a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfiguration {
    pub ledger: String,
    pub exporter_id: String,
}

impl PipelineConfiguration {
    pub fn new(ledger: impl Into<String>, exporter_id: impl Into<String>) -> Self {
        Self {
            ledger: ledger.into(),
            exporter_id: exporter_id.into(),
        }
    }
}

/// "Export ledger X's log to exporter Y starting after checkpoint Z"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub ledger: String,
    pub exporter_id: String,
    pub enabled: bool,
    /// Id of the last exported log; `None` replays from the beginning
    pub last_log_id: Option<u64>,
    /// Last transient failure, set opportunistically
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(configuration: PipelineConfiguration) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            ledger: configuration.ledger,
            exporter_id: configuration.exporter_id,
            enabled: true,
            last_log_id: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: PipelineUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(last_log_id) = update.last_log_id {
            self.last_log_id = last_log_id;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
    }
}

/// Field set for `update_pipeline`; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineUpdate {
    pub enabled: Option<bool>,
    pub last_log_id: Option<Option<u64>>,
    pub error: Option<Option<String>>,
}

impl PipelineUpdate {
    /// Re-enable and clear the checkpoint so the ledger is replayed from the start
    pub fn reset() -> Self {
        Self {
            enabled: Some(true),
            last_log_id: Some(None),
            error: Some(None),
        }
    }

    pub fn error(message: Option<String>) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

/// Ledger metadata returned alongside its log fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub id: u64,
    #[serde(rename = "type")]
    pub log_type: String,
    pub date: DateTime<Utc>,
    pub payload: Value,
}

impl Log {
    pub fn new(id: u64, log_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id,
            log_type: log_type.into(),
            date: Utc::now(),
            payload,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_pipeline_is_enabled_without_checkpoint() {
        let pipeline = Pipeline::new(PipelineConfiguration::new("default", "exp-1"));
        assert!(pipeline.enabled);
        assert_eq!(pipeline.last_log_id, None);
        assert_eq!(pipeline.ledger, "default");
        assert_eq!(pipeline.exporter_id, "exp-1");
    }

    #[test]
    fn test_pipeline_reset_update() {
        let mut pipeline = Pipeline::new(PipelineConfiguration::new("default", "exp-1"));
        pipeline.enabled = false;
        pipeline.last_log_id = Some(42);
        pipeline.error = Some("boom".to_string());

        pipeline.apply(PipelineUpdate::reset());

        assert!(pipeline.enabled);
        assert_eq!(pipeline.last_log_id, None);
        assert_eq!(pipeline.error, None);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut pipeline = Pipeline::new(PipelineConfiguration::new("default", "exp-1"));
        pipeline.last_log_id = Some(7);

        pipeline.apply(PipelineUpdate::error(Some("sink down".to_string())));

        assert_eq!(pipeline.last_log_id, Some(7));
        assert_eq!(pipeline.error.as_deref(), Some("sink down"));
    }

    #[test]
    fn test_log_serializes_type_field() {
        let log = Log::new(3, "NEW_TRANSACTION", json!({"amount": 100}));
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["type"], "NEW_TRANSACTION");
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn test_exporter_configuration_defaults_to_empty_config() {
        let configuration: ExporterConfiguration =
            serde_json::from_str(r#"{"driver": "noop"}"#).unwrap();
        assert_eq!(configuration.config, json!({}));
    }
}
