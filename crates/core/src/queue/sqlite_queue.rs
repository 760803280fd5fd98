//! SQLite-backed durable log.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::error::QueueError;
use super::traits::{DeadLetterIndex, QueueConsumer, QueueProducer};
use super::types::{DeadLetter, Message};

/// A single-partition log per topic, stored in SQLite.
pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
    topic: String,
}

impl SqliteQueue {
    /// Open (or create) the queue tables in the database file.
    pub fn new(path: &Path, topic: impl Into<String>) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            topic: topic.into(),
        })
    }

    /// Create an in-memory queue (useful for testing).
    pub fn in_memory(topic: impl Into<String>) -> Result<Self, QueueError> {
        let conn =
            Connection::open_in_memory().map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            topic: topic.into(),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| QueueError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                msg_offset INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                msg_key TEXT NOT NULL,
                payload BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_queue_messages_topic
                ON queue_messages(topic, msg_offset);

            CREATE TABLE IF NOT EXISTS queue_offsets (
                topic TEXT NOT NULL,
                group_id TEXT NOT NULL,
                committed_offset INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (topic, group_id)
            );

            CREATE TABLE IF NOT EXISTS queue_dead_letters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                group_id TEXT NOT NULL,
                msg_offset INTEGER NOT NULL,
                msg_key TEXT NOT NULL,
                payload BLOB NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_queue_dead_letters_key
                ON queue_dead_letters(topic, msg_key);
            "#,
        )
        .map_err(|e| QueueError::Database(e.to_string()))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Build a consumer for `group_id`, positioned right after the group's
    /// committed offset.
    pub fn consumer(&self, group_id: impl Into<String>) -> Result<SqliteQueueConsumer, QueueError> {
        let group_id = group_id.into();
        let committed = {
            let conn = self.conn.lock().unwrap();
            committed_offset(&conn, &self.topic, &group_id)?
        };

        let position = committed.map(|c| c + 1).unwrap_or(0);
        debug!(topic = %self.topic, group = %group_id, position, "Created queue consumer");

        Ok(SqliteQueueConsumer {
            conn: Arc::clone(&self.conn),
            topic: self.topic.clone(),
            group_id,
            position: Mutex::new(position),
        })
    }

    /// Number of messages ever appended to the topic.
    pub fn message_count(&self) -> Result<i64, QueueError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM queue_messages WHERE topic = ?",
            params![self.topic],
            |row| row.get(0),
        )
        .map_err(|e| QueueError::Database(e.to_string()))
    }

    /// Committed offset of a group, if it has committed anything.
    pub fn committed(&self, group_id: &str) -> Result<Option<i64>, QueueError> {
        let conn = self.conn.lock().unwrap();
        committed_offset(&conn, &self.topic, group_id)
    }

    /// Dead-lettered messages of the topic, oldest first.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT msg_offset, group_id, msg_key, payload, reason, created_at FROM queue_dead_letters WHERE topic = ? ORDER BY id ASC",
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![self.topic], |row| {
                let created_at: String = row.get(5)?;
                Ok(DeadLetter {
                    offset: row.get(0)?,
                    group_id: row.get(1)?,
                    key: row.get(2)?,
                    payload: row.get(3)?,
                    reason: row.get(4)?,
                    created_at: parse_timestamp(&created_at),
                })
            })
            .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| QueueError::Database(e.to_string()))
    }
}

impl QueueProducer for SqliteQueue {
    fn send(&self, key: &str, payload: &[u8]) -> Result<i64, QueueError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO queue_messages (topic, msg_key, payload, created_at) VALUES (?, ?, ?, ?)",
            params![self.topic, key, payload, Utc::now().to_rfc3339()],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }
}

impl DeadLetterIndex for SqliteQueue {
    fn is_dead_lettered(&self, key: &str) -> Result<bool, QueueError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT 1 FROM queue_dead_letters WHERE topic = ? AND msg_key = ? LIMIT 1",
            params![self.topic, key],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| QueueError::Database(e.to_string()))
    }
}

fn committed_offset(
    conn: &Connection,
    topic: &str,
    group_id: &str,
) -> Result<Option<i64>, QueueError> {
    conn.query_row(
        "SELECT committed_offset FROM queue_offsets WHERE topic = ? AND group_id = ?",
        params![topic, group_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| QueueError::Database(e.to_string()))
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Consumer-group view over a [`SqliteQueue`] topic.
pub struct SqliteQueueConsumer {
    conn: Arc<Mutex<Connection>>,
    topic: String,
    group_id: String,
    position: Mutex<i64>,
}

impl SqliteQueueConsumer {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

impl QueueConsumer for SqliteQueueConsumer {
    fn fetch(&self) -> Result<Option<Message>, QueueError> {
        let mut position = self.position.lock().unwrap();
        let conn = self.conn.lock().unwrap();

        let message = conn
            .query_row(
                "SELECT msg_offset, msg_key, payload, created_at FROM queue_messages WHERE topic = ? AND msg_offset >= ? ORDER BY msg_offset ASC LIMIT 1",
                params![self.topic, *position],
                |row| {
                    let created_at: String = row.get(3)?;
                    Ok(Message {
                        offset: row.get(0)?,
                        key: row.get(1)?,
                        payload: row.get(2)?,
                        created_at: parse_timestamp(&created_at),
                    })
                },
            )
            .optional()
            .map_err(|e| QueueError::Database(e.to_string()))?;

        if let Some(ref msg) = message {
            *position = msg.offset + 1;
        }
        Ok(message)
    }

    fn seek(&self, offset: i64) {
        *self.position.lock().unwrap() = offset;
    }

    fn position(&self) -> i64 {
        *self.position.lock().unwrap()
    }

    fn commit(&self, message: &Message) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO queue_offsets (topic, group_id, committed_offset, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(topic, group_id) DO UPDATE SET
                committed_offset = MAX(committed_offset, excluded.committed_offset),
                updated_at = excluded.updated_at
            "#,
            params![
                self.topic,
                self.group_id,
                message.offset,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(())
    }

    fn dead_letter(&self, message: &Message, reason: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO queue_dead_letters (topic, group_id, msg_offset, msg_key, payload, reason, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                self.topic,
                self.group_id,
                message.offset,
                message.key,
                message.payload,
                reason,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(())
    }
}
