use crate::database::DatabaseEngine;
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum BackupError {
    Config(String),
    UnsupportedEngine(String),
    ToolNotFound(DatabaseEngine),
    Start { program: PathBuf, source: io::Error },
    Process { program: PathBuf, code: Option<i32> },
    Compression(String),
    Upload(String),
    Io(io::Error),
    Serialization(String),
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BackupError::UnsupportedEngine(kind) => {
                write!(f, "Unsupported database type: {:?}", kind)
            }
            BackupError::ToolNotFound(engine) => {
                write!(f, "{} not found in PATH", engine.tool())
            }
            BackupError::Start { program, source } => {
                write!(f, "Failed to start {}: {}", program.display(), source)
            }
            BackupError::Process { program, code: Some(code) } => {
                write!(f, "{} exited with status {}", program.display(), code)
            }
            BackupError::Process { program, code: None } => {
                write!(f, "{} was terminated by a signal", program.display())
            }
            BackupError::Compression(msg) => write!(f, "Compression error: {}", msg),
            BackupError::Upload(msg) => write!(f, "Upload error: {}", msg),
            BackupError::Io(err) => write!(f, "IO error: {}", err),
            BackupError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            BackupError::Start { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<toml::de::Error> for BackupError {
    fn from(err: toml::de::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for BackupError {
    fn from(err: url::ParseError) -> Self {
        BackupError::Config(format!("invalid database URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
