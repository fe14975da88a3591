mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::start::{DestroyArgs, StartArgs};

#[derive(Parser)]
#[command(author, version, about = "AuditDBX server CLI")]
struct Cli {
    /// Path to the configuration file. Defaults to ~/.auditdbx/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the audit ingestion server
    Start(StartArgs),
    /// Dump every aggregated commit group from the store
    Logs,
    /// Destroy all audit data and configuration
    Destroy(DestroyArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Start(args) => commands::start::execute(config, args).await?,
        Commands::Logs => commands::logs::execute(config)?,
        Commands::Destroy(args) => commands::start::destroy(config, args)?,
    }

    Ok(())
}
