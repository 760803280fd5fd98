//! Producer side: enqueue image jobs with retry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::error::QueueError;
use super::retry::{retry_with_policy, RetryPolicy};
use super::traits::QueueProducer;
use crate::images::ImageRecord;
use crate::metrics;

/// Schedules an image record for asynchronous processing.
#[async_trait]
pub trait JobProducer: Send + Sync {
    /// Durably enqueue `image`, returning the message offset.
    async fn enqueue(&self, image: &ImageRecord) -> Result<i64, QueueError>;
}

/// Publishes image records as JSON, keyed by record id.
pub struct ImageQueue {
    producer: Arc<dyn QueueProducer>,
    policy: RetryPolicy,
}

impl ImageQueue {
    pub fn new(producer: Arc<dyn QueueProducer>, policy: RetryPolicy) -> Self {
        Self { producer, policy }
    }
}

#[async_trait]
impl JobProducer for ImageQueue {
    async fn enqueue(&self, image: &ImageRecord) -> Result<i64, QueueError> {
        let payload =
            serde_json::to_vec(image).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let key = image.id.to_string();

        let producer = &self.producer;
        match retry_with_policy(&self.policy, "send", || producer.send(&key, &payload)).await {
            Ok(offset) => {
                metrics::ENQUEUE_TOTAL.with_label_values(&["success"]).inc();
                debug!(id = %image.id, offset, "Enqueued image job");
                Ok(offset)
            }
            Err(e) => {
                metrics::ENQUEUE_TOTAL.with_label_values(&["failed"]).inc();
                error!(id = %image.id, "Enqueue failed after retries: {}", e);
                Err(QueueError::SendFailed {
                    attempts: self.policy.attempts.max(1),
                    reason: e.to_string(),
                })
            }
        }
    }
}
