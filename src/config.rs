use std::{
    env, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const STORE_DIR_NAME: &str = "log-audit";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Config {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            port: DEFAULT_PORT,
            data_dir: default_data_dir(),
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AuditError::Config("unable to locate user home directory".into()))?;
    Ok(home.join(".auditdbx").join("config.toml"))
}

pub fn load_or_default(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let config_path = if let Some(path) = path {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        path
    } else {
        let path = default_config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        path
    };

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)?;
        config.ensure_data_dir()?;
        Ok((config, config_path))
    } else {
        let config = Config::default();
        config.ensure_data_dir()?;
        config.save(&config_path)?;
        Ok((config, config_path))
    }
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    env::temp_dir().join(STORE_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_root_the_store_under_the_temp_dir() {
        let config = Config::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.data_dir, env::temp_dir().join(STORE_DIR_NAME));
    }

    #[test]
    fn load_or_default_round_trips_through_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let (mut written, written_path) = load_or_default(Some(path.clone())).unwrap();
        assert_eq!(written_path, path);
        written.port = 9999;
        written.save(&path).unwrap();

        let (reloaded, _) = load_or_default(Some(path)).unwrap();
        assert_eq!(reloaded.port, 9999);
        assert_eq!(reloaded.data_dir, written.data_dir);
    }
}
