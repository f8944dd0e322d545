use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while writing or opening the on-disk index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("{}: truncated, expected at least {expected} bytes, found {actual}", .file.display())]
    Truncated { file: PathBuf, expected: u64, actual: u64 },

    #[error("{}: corrupt: {reason}", .file.display())]
    Corrupt { file: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn corrupt(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IndexError::Corrupt { file: file.into(), reason: reason.into() }
    }
}
