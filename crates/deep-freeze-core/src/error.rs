use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid exclusion pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Backup root does not exist or is not a directory: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("No client root configured for {0}")]
    ClientRootNotFound(String),

    #[error("Content unavailable for {}: {reason}", path.display())]
    ContentUnavailable { path: PathBuf, reason: String },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Remote delete failed: {0}")]
    RemoteDeleteFailed(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for per-file failures that skip the file but keep the unit open.
    pub fn is_content_unavailable(&self) -> bool {
        matches!(self, Error::ContentUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
