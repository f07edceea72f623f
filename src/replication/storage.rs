use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ledger::StoreError;
use crate::models::{Exporter, LedgerInfo, Log, Pipeline, PipelineUpdate};

/// "Logs with id strictly greater than `after`, ascending, at most `page_size`"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub after: Option<u64>,
    pub page_size: usize,
}

impl LogQuery {
    pub fn new(after: Option<u64>, page_size: usize) -> Self {
        Self { after, page_size }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPage {
    pub data: Vec<Log>,
    /// Another log exists after the last one of this page
    pub has_more: bool,
}

/// Read access to one ledger's log
#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn list_logs(&self, query: LogQuery) -> Result<LogPage, StoreError>;
}

/// Persistence contract of the replication engine
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_exporter(&self, exporter: &Exporter) -> Result<(), StoreError>;
    async fn get_exporter(&self, id: &str) -> Result<Exporter, StoreError>;
    async fn list_exporters(&self) -> Result<Vec<Exporter>, StoreError>;
    /// Replace driver and config of an existing exporter
    async fn update_exporter(&self, exporter: &Exporter) -> Result<(), StoreError>;
    /// Delete an exporter and every pipeline referencing it
    async fn delete_exporter(&self, id: &str) -> Result<(), StoreError>;

    async fn create_pipeline(&self, pipeline: &Pipeline) -> Result<(), StoreError>;
    async fn get_pipeline(&self, id: &str) -> Result<Pipeline, StoreError>;
    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, StoreError>;
    async fn list_enabled_pipelines(&self) -> Result<Vec<Pipeline>, StoreError>;
    async fn update_pipeline(&self, id: &str, update: PipelineUpdate) -> Result<Pipeline, StoreError>;
    /// Persist a checkpoint; the error field is cleared
    async fn store_pipeline_state(&self, id: &str, last_log_id: u64) -> Result<(), StoreError>;
    async fn delete_pipeline(&self, id: &str) -> Result<(), StoreError>;

    async fn open_ledger(&self, name: &str) -> Result<(Arc<dyn LogFetcher>, LedgerInfo), StoreError>;
}

/// Per-ledger progress of the global exporter
#[async_trait]
pub trait ExportStateStore: Storage {
    /// Every known ledger, ordered by name
    async fn ledgers(&self) -> Result<Vec<LedgerInfo>, StoreError>;
    /// Last exported log id, keyed by ledger name
    async fn list_export_states(&self) -> Result<HashMap<String, u64>, StoreError>;
    async fn store_export_state(&self, ledger: &str, last_log_id: u64) -> Result<(), StoreError>;
    /// Forget every ledger's progress so the next pass exports from the start
    async fn clear_export_states(&self) -> Result<(), StoreError>;
}
