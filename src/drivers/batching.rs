use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::DriverConfig;
use crate::humanize::HumanDuration;

/// Key of the batching sub-object inside every exporter config
pub const BATCHING_KEY: &str = "batching";

/// Flush interval applied when neither bound is configured
pub const DEFAULT_FLUSH_INTERVAL: HumanDuration = HumanDuration::from_secs(1);

/// Batching policy of an exporter
///
/// A zero `max_items` means "no size bound", a zero `flush_interval` means
/// "no time bound". At least one bound must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchingConfig {
    #[serde(default)]
    pub max_items: usize,
    #[serde(default)]
    pub flush_interval: HumanDuration,
}

impl BatchingConfig {
    pub fn new(max_items: usize, flush_interval: HumanDuration) -> Self {
        Self {
            max_items,
            flush_interval,
        }
    }

    /// Extract the `batching` sub-object of a raw exporter config (absent or null -> zero value)
    pub fn from_exporter_config(raw: &Value) -> Result<Self, serde_json::Error> {
        match raw.get(BATCHING_KEY) {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone()),
            _ => Ok(Self::default()),
        }
    }
}

impl DriverConfig for BatchingConfig {
    fn set_defaults(&mut self) {
        if self.max_items == 0 && self.flush_interval.is_zero() {
            self.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_items == 0 && self.flush_interval.is_zero() {
            return Err("flushInterval must be greater than zero when maxItems is 0".to_string());
        }
        Ok(())
    }
}
