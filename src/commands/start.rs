use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use auditdbx::{config::load_or_default, logging, server};

#[derive(Args, Clone, Default)]
pub struct StartArgs {
    /// Override the configured server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the configured data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

pub async fn execute(config_path: Option<PathBuf>, args: StartArgs) -> Result<()> {
    let (mut config, config_path) = load_or_default(config_path)?;

    if args.port.is_some() || args.data_dir.is_some() {
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(data_dir) = args.data_dir {
            config.data_dir = data_dir;
            config.ensure_data_dir()?;
        }
        config.updated_at = Utc::now();
        config.save(&config_path)?;
    }

    logging::init()?;
    server::run(config).await?;
    Ok(())
}

pub fn destroy(config_path: Option<PathBuf>, args: DestroyArgs) -> Result<()> {
    let (config, config_path) = load_or_default(config_path)?;

    if !args.yes {
        let prompt = format!(
            "This will permanently delete {} and {}. Continue?",
            config.data_dir.display(),
            config_path.display()
        );
        if !confirm(&prompt)? {
            println!("aborted");
            return Ok(());
        }
    }

    if config.data_dir.exists() {
        fs::remove_dir_all(&config.data_dir)?;
    }
    if config_path.exists() {
        fs::remove_file(&config_path)?;
    }
    println!("audit data removed");
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes" | "YES"))
}
