//! Error types for fstriage

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// fstriage error type
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot extract metadata from {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] fstriage_db::BackendError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Classifier error: {0}")]
    Classifier(String),
}

impl TriageError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn extract(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Extract {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TriageError>;
