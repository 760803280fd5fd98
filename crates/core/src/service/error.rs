//! Error types for the orchestration service.

use thiserror::Error;
use uuid::Uuid;

use crate::images::{ActionError, ImageStoreError};
use crate::queue::QueueError;
use crate::storage::StorageError;
use crate::transform::TransformError;

/// Errors surfaced by [`super::ImageService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No record with this id.
    #[error("Image not found: {0}")]
    NotFound(Uuid),

    /// Rejected input; never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] ImageStoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl From<ActionError> for ServiceError {
    fn from(e: ActionError) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl ServiceError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::Validation(_) => false,
            Self::Store(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            Self::Queue(e) => e.is_retryable(),
            Self::Transform(e) => e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(!ServiceError::NotFound(Uuid::nil()).is_retryable());
        assert!(!ServiceError::from(ActionError::UnknownAction("x".into())).is_retryable());
        assert!(ServiceError::Store(ImageStoreError::Database("locked".into())).is_retryable());
        assert!(!ServiceError::Transform(TransformError::Decode("bad".into())).is_retryable());
        assert!(ServiceError::Queue(QueueError::SendFailed {
            attempts: 3,
            reason: "down".into()
        })
        .is_retryable());
    }
}
