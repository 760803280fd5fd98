//! Error types for the artifact store.

use thiserror::Error;

/// Errors that can occur while reading or writing artifacts.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No artifact at the given path.
    #[error("Artifact not found: {path}")]
    NotFound { path: String },

    /// Namespace, key or path is not acceptable.
    #[error("Invalid artifact key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
