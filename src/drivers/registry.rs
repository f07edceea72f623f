use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::batcher::Batcher;
use super::batching::{BATCHING_KEY, BatchingConfig};
use super::http::{HttpDriver, HttpDriverConfig};
use super::noop::{NoopConfig, NoopDriver};
use super::stdout::{StdoutConfig, StdoutDriver};
use super::traits::{Driver, DriverConfig, DriverError};
use crate::ledger::StoreError;
use crate::replication::Storage;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("driver not found: {0}")]
    DriverNotFound(String),

    #[error("exporter not found: {0}")]
    ExporterNotFound(String),

    #[error("malformed configuration for driver '{driver}': {source}")]
    MalformedConfiguration {
        driver: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration for driver '{driver}': {reason}")]
    InvalidConfiguration { driver: String, reason: String },

    #[error("driver construction failed: {0}")]
    Construction(#[from] DriverError),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl RegistryError {
    /// Errors caused by the caller's input rather than the system
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DriverNotFound(_)
                | Self::MalformedConfiguration { .. }
                | Self::InvalidConfiguration { .. }
        )
    }
}

/// Validates an exporter configuration before it is persisted
pub trait ConfigValidator: Send + Sync {
    fn validate_config(&self, driver: &str, config: &Value) -> Result<(), RegistryError>;
}

/// Builds the live driver of a persisted exporter
///
/// Returns the driver together with the raw config it was built from.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self, exporter_id: &str) -> Result<(Arc<dyn Driver>, Value), RegistryError>;
}

type Constructor = Box<dyn Fn(&Value) -> Result<Arc<dyn Driver>, RegistryError> + Send + Sync>;
type Validator = Box<dyn Fn(&Value) -> Result<(), RegistryError> + Send + Sync>;

struct DriverEntry {
    construct: Constructor,
    validate: Validator,
}

/// Registry mapping driver names to typed constructors
pub struct DriverRegistry {
    drivers: BTreeMap<String, DriverEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: BTreeMap::new(),
        }
    }

    /// Register a driver under `name`; a later registration replaces an earlier one
    pub fn register<C, D, F>(&mut self, name: impl Into<String>, constructor: F)
    where
        C: DriverConfig,
        D: Driver + 'static,
        F: Fn(C) -> Result<D, DriverError> + Send + Sync + 'static,
    {
        let name = name.into();

        let construct_name = name.clone();
        let construct: Constructor = Box::new(move |raw| {
            let config = decode_config::<C>(&construct_name, raw)?;
            let driver = constructor(config)?;
            Ok(Arc::new(driver) as Arc<dyn Driver>)
        });

        let validate_name = name.clone();
        let validate: Validator = Box::new(move |raw| {
            let config = decode_config::<C>(&validate_name, raw)?;
            config
                .validate()
                .map_err(|reason| RegistryError::InvalidConfiguration {
                    driver: validate_name.clone(),
                    reason,
                })
        });

        self.drivers.insert(name, DriverEntry { construct, validate });
    }

    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    /// Decode `raw` into the driver's config, apply defaults and construct it (undecorated)
    pub fn create_driver(&self, name: &str, raw: &Value) -> Result<Arc<dyn Driver>, RegistryError> {
        let entry = self.entry(name)?;
        (entry.construct)(raw)
    }

    /// Validate `raw`, then construct the driver behind a [`Batcher`], as exporters get it
    pub fn create_batched_driver(
        &self,
        name: &str,
        raw: &Value,
    ) -> Result<Arc<dyn Driver>, RegistryError> {
        self.validate_config(name, raw)?;
        let driver = self.create_driver(name, raw)?;
        let batching = decode_batching(name, raw)?;
        Ok(Arc::new(Batcher::new(driver, batching)))
    }

    fn entry(&self, name: &str) -> Result<&DriverEntry, RegistryError> {
        self.drivers
            .get(name)
            .ok_or_else(|| RegistryError::DriverNotFound(name.to_string()))
    }

    /// Create registry with built-in drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("noop", |_: NoopConfig| Ok(NoopDriver::new()));
        registry.register("stdout", |config: StdoutConfig| Ok(StdoutDriver::new(config)));
        registry.register("http", |config: HttpDriverConfig| HttpDriver::new(config));

        registry
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator for DriverRegistry {
    fn validate_config(&self, driver: &str, config: &Value) -> Result<(), RegistryError> {
        (self.entry(driver)?.validate)(config)?;
        decode_batching(driver, config).map(|_| ())
    }
}

/// Driver config decoding: the `batching` sub-object belongs to the decorator
fn decode_config<C: DriverConfig>(driver: &str, raw: &Value) -> Result<C, RegistryError> {
    let mut raw = match raw {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    if let Value::Object(fields) = &mut raw {
        fields.remove(BATCHING_KEY);
    }

    let mut config: C =
        serde_json::from_value(raw).map_err(|source| RegistryError::MalformedConfiguration {
            driver: driver.to_string(),
            source,
        })?;
    config.set_defaults();
    Ok(config)
}

fn decode_batching(driver: &str, raw: &Value) -> Result<BatchingConfig, RegistryError> {
    let mut batching = BatchingConfig::from_exporter_config(raw).map_err(|source| {
        RegistryError::MalformedConfiguration {
            driver: driver.to_string(),
            source,
        }
    })?;
    batching.set_defaults();
    batching
        .validate()
        .map_err(|reason| RegistryError::InvalidConfiguration {
            driver: driver.to_string(),
            reason,
        })?;
    Ok(batching)
}

/// Factory resolving exporters from storage and drivers from the registry
pub struct RegistryFactory {
    registry: Arc<DriverRegistry>,
    storage: Arc<dyn Storage>,
}

impl RegistryFactory {
    pub fn new(registry: Arc<DriverRegistry>, storage: Arc<dyn Storage>) -> Self {
        Self { registry, storage }
    }
}

#[async_trait]
impl DriverFactory for RegistryFactory {
    async fn create(&self, exporter_id: &str) -> Result<(Arc<dyn Driver>, Value), RegistryError> {
        let exporter = self
            .storage
            .get_exporter(exporter_id)
            .await
            .map_err(|err| match err {
                StoreError::ExporterNotFound(id) => RegistryError::ExporterNotFound(id),
                other => RegistryError::Storage(other),
            })?;

        debug!(exporter = %exporter.id, driver = %exporter.driver, "Creating driver");
        let driver = self.registry.create_driver(&exporter.driver, &exporter.config)?;

        Ok((driver, exporter.config))
    }
}

/// Factory decorating every driver of the inner factory with a [`Batcher`]
pub struct BatchingDriverFactory<F> {
    inner: F,
}

impl<F: DriverFactory> BatchingDriverFactory<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<F: DriverFactory> DriverFactory for BatchingDriverFactory<F> {
    async fn create(&self, exporter_id: &str) -> Result<(Arc<dyn Driver>, Value), RegistryError> {
        let (driver, raw) = self.inner.create(exporter_id).await?;
        let batching = decode_batching(exporter_id, &raw)?;

        Ok((Arc::new(Batcher::new(driver, batching)), raw))
    }
}
