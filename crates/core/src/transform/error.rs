//! Error types for the transformation engine.

use thiserror::Error;

use crate::images::ActionError;
use crate::storage::StorageError;

/// Errors that can occur while producing a derived image.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Action parameters are missing or out of range.
    #[error("Invalid action parameters: {0}")]
    InvalidParams(#[from] ActionError),

    /// Source bytes are not a decodable raster image.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Output could not be encoded.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Reading the source or writing the result failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The blocking worker panicked or was cancelled.
    #[error("Transform task failed: {0}")]
    Task(String),
}

impl TransformError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::Task(_) => true,
            Self::InvalidParams(_) | Self::Decode(_) | Self::Encode(_) => false,
        }
    }
}
