use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::models::{Exporter, LedgerInfo, Log, Pipeline, PipelineUpdate};
use crate::replication::{ExportStateStore, LogFetcher, LogPage, LogQuery, Storage};

use super::error::{Result, StoreError};
use super::partitions::{
    EXPORT_STATES, EXPORTERS, LEDGERS, LOGS, PIPELINES, decode_export_state_key, decode_log_key,
    encode_export_state_key, encode_exporter_key, encode_ledger_key, encode_log_key,
    encode_log_prefix, encode_pipeline_key, is_valid_ledger_name,
};

/// Fjall-backed persistent storage for exporters, pipelines and ledger logs
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    exporters: PartitionHandle,
    pipelines: PartitionHandle,
    ledgers: PartitionHandle,
    logs: PartitionHandle,
    export_states: PartitionHandle,
    /// Serializes read-modify-write sequences (pipeline updates, log id assignment)
    write_lock: Arc<Mutex<()>>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let exporters = keyspace.open_partition(EXPORTERS, PartitionCreateOptions::default())?;
        let pipelines = keyspace.open_partition(PIPELINES, PartitionCreateOptions::default())?;
        let ledgers = keyspace.open_partition(LEDGERS, PartitionCreateOptions::default())?;
        let logs = keyspace.open_partition(LOGS, PartitionCreateOptions::default())?;
        let export_states =
            keyspace.open_partition(EXPORT_STATES, PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            exporters,
            pipelines,
            ledgers,
            logs,
            export_states,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read<T: DeserializeOwned>(partition: &PartitionHandle, key: Vec<u8>) -> Result<Option<T>> {
        match partition.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn read_all<T: DeserializeOwned>(partition: &PartitionHandle) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in partition.iter() {
            let (_, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    /// Register a ledger; returns the existing one if already known
    pub fn create_ledger(&self, name: &str) -> Result<LedgerInfo> {
        if !is_valid_ledger_name(name) {
            return Err(StoreError::InvalidLedgerName(name.to_string()));
        }

        let _guard = self.lock();
        if let Some(existing) = Self::read(&self.ledgers, encode_ledger_key(name))? {
            return Ok(existing);
        }

        let info = LedgerInfo {
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.ledgers
            .insert(encode_ledger_key(name), serde_json::to_vec(&info)?)?;
        info!(ledger = name, "Created ledger");
        Ok(info)
    }

    pub fn get_ledger(&self, name: &str) -> Result<LedgerInfo> {
        Self::read(&self.ledgers, encode_ledger_key(name))?
            .ok_or_else(|| StoreError::LedgerNotFound(name.to_string()))
    }

    pub fn list_ledgers(&self) -> Result<Vec<LedgerInfo>> {
        Self::read_all(&self.ledgers)
    }

    /// Append entries to a ledger's log, assigning ids after the current tail
    pub fn append_logs(&self, ledger: &str, entries: Vec<(String, Value)>) -> Result<Vec<Log>> {
        let _guard = self.lock();
        if self.ledgers.get(encode_ledger_key(ledger))?.is_none() {
            return Err(StoreError::LedgerNotFound(ledger.to_string()));
        }

        let mut next_id = self.tail_id(ledger)?.map_or(1, |id| id + 1);
        let mut batch = self.keyspace.batch();
        let mut appended = Vec::with_capacity(entries.len());

        for (log_type, payload) in entries {
            let log = Log::new(next_id, log_type, payload);
            batch.insert(
                &self.logs,
                encode_log_key(ledger, log.id),
                serde_json::to_vec(&log)?,
            );
            appended.push(log);
            next_id += 1;
        }

        batch.commit()?;
        debug!(ledger, count = appended.len(), "Appended logs");
        Ok(appended)
    }

    fn tail_id(&self, ledger: &str) -> Result<Option<u64>> {
        match self.logs.prefix(encode_log_prefix(ledger)).next_back() {
            Some(item) => {
                let (key, _) = item?;
                Ok(decode_log_key(&key).map(|(_, id)| id))
            }
            None => Ok(None),
        }
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            exporter_count: self.exporters.len()?,
            pipeline_count: self.pipelines.len()?,
            ledger_count: self.ledgers.len()?,
            log_count: self.logs.len()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub exporter_count: usize,
    pub pipeline_count: usize,
    pub ledger_count: usize,
    pub log_count: usize,
}

#[async_trait]
impl Storage for FjallStore {
    async fn create_exporter(&self, exporter: &Exporter) -> Result<()> {
        self.exporters.insert(
            encode_exporter_key(&exporter.id),
            serde_json::to_vec(exporter)?,
        )?;
        debug!(exporter = %exporter.id, driver = %exporter.driver, "Stored exporter");
        Ok(())
    }

    async fn get_exporter(&self, id: &str) -> Result<Exporter> {
        Self::read(&self.exporters, encode_exporter_key(id))?
            .ok_or_else(|| StoreError::ExporterNotFound(id.to_string()))
    }

    async fn list_exporters(&self) -> Result<Vec<Exporter>> {
        Self::read_all(&self.exporters)
    }

    async fn update_exporter(&self, exporter: &Exporter) -> Result<()> {
        let _guard = self.lock();
        let key = encode_exporter_key(&exporter.id);
        if self.exporters.get(&key)?.is_none() {
            return Err(StoreError::ExporterNotFound(exporter.id.clone()));
        }
        self.exporters.insert(key, serde_json::to_vec(exporter)?)?;
        Ok(())
    }

    async fn delete_exporter(&self, id: &str) -> Result<()> {
        let _guard = self.lock();
        let key = encode_exporter_key(id);
        if self.exporters.get(&key)?.is_none() {
            return Err(StoreError::ExporterNotFound(id.to_string()));
        }

        let mut batch = self.keyspace.batch();
        batch.remove(&self.exporters, key);
        let mut cascaded = 0;
        for pipeline in Self::read_all::<Pipeline>(&self.pipelines)? {
            if pipeline.exporter_id == id {
                batch.remove(&self.pipelines, encode_pipeline_key(&pipeline.id));
                cascaded += 1;
            }
        }
        batch.commit()?;

        debug!(exporter = id, cascaded, "Deleted exporter");
        Ok(())
    }

    async fn create_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
        self.pipelines.insert(
            encode_pipeline_key(&pipeline.id),
            serde_json::to_vec(pipeline)?,
        )?;
        Ok(())
    }

    async fn get_pipeline(&self, id: &str) -> Result<Pipeline> {
        Self::read(&self.pipelines, encode_pipeline_key(id))?
            .ok_or_else(|| StoreError::PipelineNotFound(id.to_string()))
    }

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        Self::read_all(&self.pipelines)
    }

    async fn list_enabled_pipelines(&self) -> Result<Vec<Pipeline>> {
        let pipelines: Vec<Pipeline> = Self::read_all(&self.pipelines)?;
        Ok(pipelines.into_iter().filter(|p| p.enabled).collect())
    }

    async fn update_pipeline(&self, id: &str, update: PipelineUpdate) -> Result<Pipeline> {
        let _guard = self.lock();
        let key = encode_pipeline_key(id);
        let mut pipeline: Pipeline = Self::read(&self.pipelines, key.clone())?
            .ok_or_else(|| StoreError::PipelineNotFound(id.to_string()))?;

        pipeline.apply(update);
        self.pipelines.insert(key, serde_json::to_vec(&pipeline)?)?;
        Ok(pipeline)
    }

    async fn store_pipeline_state(&self, id: &str, last_log_id: u64) -> Result<()> {
        self.update_pipeline(
            id,
            PipelineUpdate {
                last_log_id: Some(Some(last_log_id)),
                error: Some(None),
                ..PipelineUpdate::default()
            },
        )
        .await?;
        Ok(())
    }

    async fn delete_pipeline(&self, id: &str) -> Result<()> {
        let _guard = self.lock();
        let key = encode_pipeline_key(id);
        if self.pipelines.get(&key)?.is_none() {
            return Err(StoreError::PipelineNotFound(id.to_string()));
        }
        self.pipelines.remove(key)?;
        Ok(())
    }

    async fn open_ledger(&self, name: &str) -> Result<(Arc<dyn LogFetcher>, LedgerInfo)> {
        let info = self.get_ledger(name)?;
        let fetcher = LedgerLogs {
            logs: self.logs.clone(),
            ledger: name.to_string(),
        };
        Ok((Arc::new(fetcher), info))
    }
}

#[async_trait]
impl ExportStateStore for FjallStore {
    async fn ledgers(&self) -> Result<Vec<LedgerInfo>> {
        self.list_ledgers()
    }

    async fn list_export_states(&self) -> Result<HashMap<String, u64>> {
        let mut states = HashMap::new();
        for item in self.export_states.iter() {
            let (key, value) = item?;
            if let Some(ledger) = decode_export_state_key(&key) {
                states.insert(ledger, serde_json::from_slice(&value)?);
            }
        }
        Ok(states)
    }

    async fn store_export_state(&self, ledger: &str, last_log_id: u64) -> Result<()> {
        self.export_states.insert(
            encode_export_state_key(ledger),
            serde_json::to_vec(&last_log_id)?,
        )?;
        Ok(())
    }

    async fn clear_export_states(&self) -> Result<()> {
        let _guard = self.lock();
        let mut batch = self.keyspace.batch();
        let mut cleared = 0;
        for item in self.export_states.iter() {
            let (key, _) = item?;
            batch.remove(&self.export_states, key);
            cleared += 1;
        }
        batch.commit()?;

        debug!(cleared, "Cleared export states");
        Ok(())
    }
}

/// Log reader bound to one ledger
struct LedgerLogs {
    logs: PartitionHandle,
    ledger: String,
}

#[async_trait]
impl LogFetcher for LedgerLogs {
    async fn list_logs(&self, query: LogQuery) -> Result<LogPage> {
        let start_id = match query.after {
            Some(after) => match after.checked_add(1) {
                Some(id) => id,
                None => return Ok(LogPage::default()),
            },
            None => 0,
        };

        let prefix = encode_log_prefix(&self.ledger);
        let mut data = Vec::with_capacity(query.page_size);
        let mut has_more = false;

        for item in self.logs.range(encode_log_key(&self.ledger, start_id)..) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if data.len() == query.page_size {
                has_more = true;
                break;
            }
            data.push(serde_json::from_slice::<Log>(&value)?);
        }

        Ok(LogPage { data, has_more })
    }
}
