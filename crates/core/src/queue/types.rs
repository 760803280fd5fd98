//! Queue message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message read from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Position in the topic; strictly increasing.
    pub offset: i64,
    /// Delivery key. Messages with the same key keep their relative order.
    pub key: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// A message that was given up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub offset: i64,
    pub group_id: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
