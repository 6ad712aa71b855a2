//! Storage-specific error type.

use std::path::PathBuf;

use nudge_domain::error::NudgeError;

/// Errors originating from the pack storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest does not name a rule file.
    #[error("pack {0} declares no trigger file")]
    NoRuleFile(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

impl From<StorageError> for NudgeError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}
