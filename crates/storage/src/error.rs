use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state in {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("invalid record: {0}")]
    Invalid(#[from] watchdesk_core::CoreError),

    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short class label for structured logs.
    pub fn class(&self) -> &'static str {
        match self {
            StorageError::Io { .. } => "persistence_io",
            StorageError::Corrupt { .. } => "persistence_corrupt",
            StorageError::Serialize(_) => "persistence_serialize",
            StorageError::Invalid(_) => "configuration",
            StorageError::Other(_) => "persistence",
        }
    }
}
