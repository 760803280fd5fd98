//! Transport traits for the durable queue.

use super::error::QueueError;
use super::types::Message;

/// Appends messages to a topic.
pub trait QueueProducer: Send + Sync {
    /// Append a message and return its offset.
    fn send(&self, key: &str, payload: &[u8]) -> Result<i64, QueueError>;
}

/// Reads a topic on behalf of one consumer group.
///
/// The consumer keeps an in-memory fetch position separate from the
/// committed offset, so an uncommitted message can be read again either by
/// seeking back or after a restart.
pub trait QueueConsumer: Send + Sync {
    /// Next message at or after the fetch position, without blocking.
    /// Advances the fetch position past the returned message.
    fn fetch(&self) -> Result<Option<Message>, QueueError>;

    /// Move the fetch position so the next fetch starts at `offset`.
    fn seek(&self, offset: i64);

    /// Offset the next fetch starts from.
    fn position(&self) -> i64;

    /// Record `message` as processed for the group.
    fn commit(&self, message: &Message) -> Result<(), QueueError>;

    /// Park `message` in the dead-letter store with a reason.
    fn dead_letter(&self, message: &Message, reason: &str) -> Result<(), QueueError>;
}

/// Answers whether a message key has been dead-lettered on the topic.
pub trait DeadLetterIndex: Send + Sync {
    fn is_dead_lettered(&self, key: &str) -> Result<bool, QueueError>;
}
