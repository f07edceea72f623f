//! Replication engine
//!
//! Exports the append-only log of ledgers to external sinks through durable,
//! resumable pipelines.
//!
//! ## Key Components
//!
//! - [`Manager`] - Reconciles running pipelines with storage and serves lifecycle operations
//! - [`PipelineHandler`] - Per-pipeline fetch/push loop emitting checkpoints
//! - [`DriverFacade`] - Retrying driver startup with a fail-fast readiness gate
//! - [`GlobalExporterRunner`] - Optional catch-up export of every ledger to one driver
//! - [`Storage`] / [`LogFetcher`] - Persistence contract the engine depends on
//!
//! Delivery is at-least-once: a checkpoint is persisted after the push that
//! produced it, so a crash in between replays the batch on restart.

mod error;
mod facade;
mod global_exporter;
mod manager;
mod pipeline;
mod storage;

pub use error::ReplicationError;
pub use facade::DriverFacade;
pub use global_exporter::{GlobalExporterOptions, GlobalExporterRunner};
pub use manager::{Manager, ManagerOptions};
pub use pipeline::{PipelineEvent, PipelineHandler, PipelineOptions};
pub use storage::{ExportStateStore, LogFetcher, LogPage, LogQuery, Storage};
