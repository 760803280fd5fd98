//! Error types for the durable queue.

use thiserror::Error;

/// Errors that can occur while producing or consuming messages.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Underlying log storage failed.
    #[error("Queue database error: {0}")]
    Database(String),

    /// A job could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The retry policy was exhausted while sending.
    #[error("Failed to enqueue after {attempts} attempts: {reason}")]
    SendFailed { attempts: u32, reason: String },
}

impl QueueError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::SendFailed { .. })
    }
}
