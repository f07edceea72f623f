use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ledgerflow")]
#[command(about = "Replicate ledger logs to external sinks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the replication manager and its admin API
    Serve(ServeArgs),
    /// List the registered export drivers
    Drivers,
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Configuration file (defaults to $LEDGERFLOW_CONFIG or config/ledgerflow.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP server to, overrides `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Export every ledger again from the start, overrides `replication.global_exporter.reset`
    #[arg(long)]
    pub reset_global_exporter: bool,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}
