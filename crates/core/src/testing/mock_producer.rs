//! Producer doubles for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::images::ImageRecord;
use crate::queue::{JobProducer, QueueError, QueueProducer};

/// Wraps a real producer and fails its first `failures` sends.
pub struct FlakyProducer {
    inner: Arc<dyn QueueProducer>,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyProducer {
    pub fn new(inner: Arc<dyn QueueProducer>, failures: u32) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of send attempts seen so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QueueProducer for FlakyProducer {
    fn send(&self, key: &str, payload: &[u8]) -> Result<i64, QueueError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(QueueError::Database(format!(
                "injected send failure {}/{}",
                call, self.failures
            )));
        }
        self.inner.send(key, payload)
    }
}

/// Records enqueued jobs without a broker.
#[derive(Debug, Default)]
pub struct RecordingProducer {
    enqueued: Mutex<Vec<ImageRecord>>,
}

impl RecordingProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every enqueued record, in order.
    pub fn enqueued_ids(&self) -> Vec<Uuid> {
        self.enqueued.lock().unwrap().iter().map(|r| r.id).collect()
    }

    pub fn enqueued(&self) -> Vec<ImageRecord> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobProducer for RecordingProducer {
    async fn enqueue(&self, image: &ImageRecord) -> Result<i64, QueueError> {
        let mut enqueued = self.enqueued.lock().unwrap();
        enqueued.push(image.clone());
        Ok(enqueued.len() as i64)
    }
}
