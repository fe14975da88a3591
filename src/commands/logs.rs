use std::path::PathBuf;

use anyhow::Result;

use auditdbx::{config::load_or_default, store::AuditStore};

/// Prints the whole store as pretty JSON. Opens the store directly, so
/// this fails while a running server holds the database lock.
pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let (config, _) = load_or_default(config_path)?;
    let store = AuditStore::open(config.data_dir.clone())?;
    let records = store.snapshot()?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
