use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

pub const CONFIG_ENV_VAR: &str = "LEDGERFLOW_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/ledgerflow.toml";
const ENV_PREFIX: &str = "LEDGERFLOW";
const ENV_SEPARATOR: &str = "__";

/// Config file location: `$LEDGERFLOW_CONFIG` or the default path
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    load_from_sources(config_path())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // LEDGERFLOW__REPLICATION__SYNC_PERIOD -> replication.sync_period
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.replication.sync_period, HumanDuration::from_secs(5));
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
fjall_path = "/var/lib/ledgerflow"

[replication]
sync_period = "1m"
driver_retry_interval = 500

[replication.pipeline]
pull_interval = "250ms"
logs_page_size = 50

[telemetry]
log_filter = "ledgerflow=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.replication.sync_period, HumanDuration::from_secs(60));
        assert_eq!(
            config.replication.driver_retry_interval,
            HumanDuration::from_millis(500)
        );
        assert_eq!(
            config.replication.pipeline.pull_interval,
            HumanDuration::from_millis(250)
        );
        assert_eq!(config.replication.pipeline.logs_page_size, 50);
        // Unset keys keep their defaults
        assert_eq!(
            config.replication.pipeline.push_retry_period,
            HumanDuration::from_secs(10)
        );
        assert_eq!(config.telemetry.log_filter, "ledgerflow=debug");
    }
}
