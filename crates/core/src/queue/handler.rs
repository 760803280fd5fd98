//! Job handler contract used by the consume loop.

use async_trait::async_trait;
use thiserror::Error;

use super::types::Message;

/// Outcome of a failed job, deciding what the loop does with the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Retrying cannot help (bad payload, invalid params, undecodable image).
    #[error("permanent failure: {0}")]
    Permanent(String),
    /// Infrastructure hiccup; the message is delivered again.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

/// Processes one queue message.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}
