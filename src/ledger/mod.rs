/// Fjall-based persistence layer for exporters, pipelines and ledger logs
///
/// This module provides durable storage for the replication engine. It uses
/// Fjall (an embedded LSM key-value store) to persist:
///
/// - Exporters (driver name and raw configuration)
/// - Pipelines (ledger/exporter binding, enabled flag, checkpoint, last error)
/// - Ledgers and their append-only logs, read back in ascending id order
///
/// [`FjallStore`] implements the [`Storage`](crate::replication::Storage)
/// contract consumed by the manager. Ledger creation and log appends stand in
/// for the ledger core that produces logs in a full deployment.
///
/// ## Usage
///
/// ```rust,ignore
/// use ledgerflow::ledger::FjallStore;
///
/// let store = FjallStore::open("data/ledgerflow")?;
/// store.create_ledger("orders")?;
/// store.append_logs("orders", vec![("NEW_TRANSACTION".into(), json!({}))])?;
/// let (fetcher, _) = store.open_ledger("orders").await?;
/// ```

pub mod error;
pub mod partitions;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{FjallStore, StoreStats};
