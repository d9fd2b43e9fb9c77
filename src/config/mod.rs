mod types;

pub use types::*;

use crate::database::ConnectionSpec;
use crate::error::{BackupError, Result};
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::{debug, info};

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".sql_backup_daemon"))
        .unwrap_or_else(|| PathBuf::from(".sql_backup_daemon"))
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn load_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!("Config file not found at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }

    info!("Loading configuration from {:?}", path);
    let contents = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}

impl AppConfig {
    /// Every configured target, discrete entries first, then URLs in order.
    pub fn targets(&self) -> Result<Vec<ConnectionSpec>> {
        let mut targets: Vec<ConnectionSpec> =
            self.databases.iter().map(ConnectionSpec::from_config).collect();

        for url in &self.database_urls {
            targets.push(ConnectionSpec::parse_url(url)?);
        }

        Ok(targets)
    }

    pub fn validate(&self) -> Result<()> {
        if self.databases.is_empty() && self.database_urls.is_empty() {
            return Err(BackupError::Config(
                "no databases configured".to_string(),
            ));
        }

        for (index, db) in self.databases.iter().enumerate() {
            if db.host.trim().is_empty() {
                return Err(BackupError::Config(format!(
                    "missing required database host for databases[{}]",
                    index
                )));
            }
            if db.database.trim().is_empty() {
                return Err(BackupError::Config(format!(
                    "missing required database name for databases[{}] on {}",
                    index, db.host
                )));
            }
        }

        let storage = &self.storage;
        for (name, value) in [
            ("storage endpoint", &storage.endpoint),
            ("storage bucket", &storage.bucket),
            ("storage access key", &storage.access_key),
            ("storage secret key", &storage.secret_key),
        ] {
            if value.trim().is_empty() {
                return Err(BackupError::Config(format!("missing required {}", name)));
            }
        }

        if let Some(schedule) = &self.schedule {
            if schedule.as_seconds() == 0 {
                return Err(BackupError::Config(
                    "backup interval must be greater than zero".to_string(),
                ));
            }
        }

        if !(1..=22).contains(&self.compression.level) {
            return Err(BackupError::Config(format!(
                "compression level {} is outside 1..=22",
                self.compression.level
            )));
        }

        // Surface bad URLs and engine kinds at startup rather than mid-cycle.
        self.targets()?;
        Ok(())
    }
}
