mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use ledgerflow::config::Config;
use ledgerflow::drivers::DriverRegistry;
use ledgerflow::observability;
use std::path::PathBuf;

fn load_config(path: Option<PathBuf>) -> Result<Config, ledgerflow::config::ConfigError> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let mut config = load_config(args.config)?;
            observability::init_tracing(&config.telemetry.log_filter);
            if args.reset_global_exporter {
                match config.replication.global_exporter.as_mut() {
                    Some(global) => global.reset = true,
                    None => {
                        tracing::warn!("No global exporter configured, ignoring --reset-global-exporter")
                    }
                }
            }
            server::run(config, args.address).await?
        }
        Commands::Drivers => {
            for name in DriverRegistry::with_defaults().names() {
                println!("{name}");
            }
        }
        Commands::Config(args) => {
            let config = load_config(args.config)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
