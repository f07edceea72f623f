use super::models::Config;
use crate::humanize::HumanDuration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const MAX_LOGS_PAGE_SIZE: usize = 10_000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("logs_page_size must be between 1 and {max}, got {value}")]
    InvalidPageSize { value: usize, max: usize },

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_replication(config)?;
    validate_pipeline(config)?;
    validate_global_exporter(config)?;
    validate_telemetry(config)?;
    Ok(())
}

fn non_zero(field: &'static str, value: HumanDuration) -> Result<(), ValidationError> {
    if value.is_zero() {
        return Err(ValidationError::ZeroDuration { field });
    }
    Ok(())
}

fn validate_replication(config: &Config) -> Result<(), ValidationError> {
    let replication = &config.replication;
    non_zero("replication.sync_period", replication.sync_period)?;
    non_zero(
        "replication.driver_retry_interval",
        replication.driver_retry_interval,
    )?;
    non_zero("replication.stop_timeout", replication.stop_timeout)?;
    Ok(())
}

/// Zero waits would turn the export loop into a busy loop
fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    let pipeline = &config.replication.pipeline;
    non_zero("replication.pipeline.pull_interval", pipeline.pull_interval)?;
    non_zero(
        "replication.pipeline.pull_retry_period",
        pipeline.pull_retry_period,
    )?;
    non_zero(
        "replication.pipeline.push_retry_period",
        pipeline.push_retry_period,
    )?;

    page_size(pipeline.logs_page_size)
}

fn validate_global_exporter(config: &Config) -> Result<(), ValidationError> {
    let Some(global) = &config.replication.global_exporter else {
        return Ok(());
    };
    if global.driver.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "replication.global_exporter.driver",
        });
    }
    non_zero(
        "replication.global_exporter.poll_interval",
        global.poll_interval,
    )?;
    non_zero(
        "replication.global_exporter.push_retry_period",
        global.push_retry_period,
    )?;
    page_size(global.logs_page_size)
}

fn page_size(value: usize) -> Result<(), ValidationError> {
    if value == 0 || value > MAX_LOGS_PAGE_SIZE {
        return Err(ValidationError::InvalidPageSize {
            value,
            max: MAX_LOGS_PAGE_SIZE,
        });
    }
    Ok(())
}

fn validate_telemetry(config: &Config) -> Result<(), ValidationError> {
    let filter = &config.telemetry.log_filter;
    EnvFilter::try_new(filter).map_err(|e| ValidationError::InvalidLogFilter {
        filter: filter.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_sync_period() {
        let mut config = Config::default();
        config.replication.sync_period = HumanDuration::ZERO;

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::ZeroDuration {
                field: "replication.sync_period"
            })
        ));
    }

    #[test]
    fn test_zero_push_retry_period() {
        let mut config = Config::default();
        config.replication.pipeline.push_retry_period = HumanDuration::ZERO;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration { .. })
        ));
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = Config::default();

        config.replication.pipeline.logs_page_size = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidPageSize { value: 0, .. })
        ));

        config.replication.pipeline.logs_page_size = MAX_LOGS_PAGE_SIZE + 1;
        assert!(validate(&config).is_err());

        config.replication.pipeline.logs_page_size = MAX_LOGS_PAGE_SIZE;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_global_exporter_settings() {
        use crate::config::GlobalExporterConfig;
        use serde_json::json;

        let mut config = Config::default();
        config.replication.global_exporter = Some(GlobalExporterConfig::new("stdout", json!({})));
        assert!(validate(&config).is_ok());

        if let Some(global) = config.replication.global_exporter.as_mut() {
            global.poll_interval = HumanDuration::ZERO;
        }
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration {
                field: "replication.global_exporter.poll_interval"
            })
        ));

        config.replication.global_exporter = Some(GlobalExporterConfig::new(" ", json!({})));
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingField { .. })
        ));
    }

    #[test]
    fn test_invalid_log_filter() {
        let mut config = Config::default();
        config.telemetry.log_filter = "ledgerflow=notalevel".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidLogFilter { .. })
        ));
    }
}
