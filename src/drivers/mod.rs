//! Driver layer
//!
//! Drivers are the pluggable adapters writing logs to external sinks.
//!
//! ## Key Components
//!
//! - [`Driver`] - Contract every sink implements (`start`, `stop`, `accept`)
//! - [`DriverRegistry`] - Maps driver names to typed constructors and validates configs
//! - [`BatchingDriverFactory`] - Wraps every constructed driver in a [`Batcher`]
//! - [`NoopDriver`], [`StdoutDriver`], [`HttpDriver`] - Built-in sinks
//! - [`MockDriver`] - Scriptable in-memory driver for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledgerflow::drivers::{ConfigValidator, DriverRegistry};
//!
//! let registry = DriverRegistry::with_defaults();
//! registry.validate_config("http", &json!({"url": "http://sink/logs"}))?;
//! let driver = registry.create_driver("http", &json!({"url": "http://sink/logs"}))?;
//! driver.start().await?;
//! ```

mod batcher;
mod batching;
mod http;
mod mock;
mod noop;
mod registry;
mod stdout;
mod traits;
pub(crate) mod types;

pub use batcher::Batcher;
pub use batching::{BATCHING_KEY, BatchingConfig, DEFAULT_FLUSH_INTERVAL};
pub use http::{HttpDriver, HttpDriverConfig};
pub use mock::MockDriver;
pub use noop::{NoopConfig, NoopDriver};
pub use registry::{
    BatchingDriverFactory, ConfigValidator, DriverFactory, DriverRegistry, RegistryError,
    RegistryFactory,
};
pub use stdout::{StdoutConfig, StdoutDriver};
pub use traits::{Driver, DriverConfig, DriverError, ItemResults};
pub use types::LogWithLedger;
