use crate::error::BackupError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl std::fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseEngine::Postgres => write!(f, "postgres"),
            DatabaseEngine::Mysql => write!(f, "mysql"),
        }
    }
}

impl FromStr for DatabaseEngine {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseEngine::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseEngine::Mysql),
            _ => Err(BackupError::UnsupportedEngine(s.to_string())),
        }
    }
}

/// A discretely configured target. `port` falls back to the engine default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub engine: DatabaseEngine,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: DatabaseEngine::Postgres,
            host: "localhost".to_string(),
            port: None,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value")]
pub enum Schedule {
    Seconds(u32),
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl Schedule {
    pub fn as_seconds(&self) -> u64 {
        match self {
            Schedule::Seconds(n) => *n as u64,
            Schedule::Minutes(n) => *n as u64 * 60,
            Schedule::Hours(n) => *n as u64 * 3600,
            Schedule::Days(n) => *n as u64 * 86400,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.as_seconds())
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Seconds(n) => write!(f, "Every {} second(s)", n),
            Schedule::Minutes(n) => write!(f, "Every {} minute(s)", n),
            Schedule::Hours(n) => write!(f, "Every {} hour(s)", n),
            Schedule::Days(n) => write!(f, "Every {} day(s)", n),
        }
    }
}

/// Parses `30s`, `15m`, `24h`, `7d`; a bare number is taken as seconds.
impl FromStr for Schedule {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let n: u32 = digits
            .parse()
            .map_err(|_| BackupError::Config(format!("invalid interval: {:?}", s)))?;

        match unit {
            "" | "s" => Ok(Schedule::Seconds(n)),
            "m" => Ok(Schedule::Minutes(n)),
            "h" => Ok(Schedule::Hours(n)),
            "d" => Ok(Schedule::Days(n)),
            _ => Err(BackupError::Config(format!(
                "invalid interval unit {:?} in {:?}",
                unit, s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: "database-backups".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            prefix: None,
            force_path_style: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default)]
    pub keep_original: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            keep_original: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    #[serde(default)]
    pub database_urls: Vec<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Directory list searched for dump tools instead of `PATH`.
    #[serde(default)]
    pub tool_path: Option<PathBuf>,
    pub local_backup_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            database_urls: Vec::new(),
            storage: StorageConfig::default(),
            schedule: None,
            compression: CompressionConfig::default(),
            tool_path: None,
            local_backup_dir: PathBuf::from("backups"),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_level() -> i32 {
    19
}

fn default_true() -> bool {
    true
}
