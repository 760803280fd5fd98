//! Durable job queue: producer with retry, SQLite log and consume loop.

mod consumer;
mod error;
mod handler;
mod producer;
mod retry;
mod sqlite_queue;
mod traits;
mod types;

pub use consumer::{ConsumeLoop, ConsumeSettings, JobConsumer, Step};
pub use error::QueueError;
pub use handler::{HandlerError, JobHandler};
pub use producer::{ImageQueue, JobProducer};
pub use retry::{retry_with_policy, RetryPolicy};
pub use sqlite_queue::{SqliteQueue, SqliteQueueConsumer};
pub use traits::{DeadLetterIndex, QueueConsumer, QueueProducer};
pub use types::{DeadLetter, Message};
