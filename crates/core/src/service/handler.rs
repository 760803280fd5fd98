//! Queue handler that runs image jobs through the service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::image_service::ImageService;
use crate::images::ImageRecord;
use crate::queue::{HandlerError, JobHandler, Message};

/// Decodes a queued image record and processes it.
pub struct ImageJobHandler {
    service: Arc<ImageService>,
}

impl ImageJobHandler {
    pub fn new(service: Arc<ImageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for ImageJobHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let job: ImageRecord = serde_json::from_slice(&message.payload)
            .map_err(|e| HandlerError::Permanent(format!("undecodable job payload: {}", e)))?;

        if message.key != job.id.to_string() {
            warn!(key = %message.key, id = %job.id, "Message key does not match job id");
        }

        match self.service.process_image(&job).await {
            Ok(derived) => {
                info!(id = %job.id, derived = %derived, "Job processed");
                Ok(())
            }
            Err(e) if e.is_retryable() => Err(HandlerError::Transient(e.to_string())),
            Err(e) => Err(HandlerError::Permanent(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformConfig;
    use crate::images::{Action, Dimensions, ImageStore, SqliteImageStore};
    use crate::testing::{fixtures, MockArtifactStore, RecordingProducer};
    use crate::transform::ImageEngine;
    use chrono::Utc;

    fn setup() -> (Arc<ImageService>, Arc<SqliteImageStore>, Arc<MockArtifactStore>) {
        let images = Arc::new(SqliteImageStore::in_memory().unwrap());
        let artifacts = Arc::new(MockArtifactStore::new());
        let service = Arc::new(ImageService::new(
            images.clone(),
            artifacts.clone(),
            Arc::new(RecordingProducer::new()),
            Arc::new(ImageEngine::new(artifacts.clone(), &TransformConfig::default())),
        ));
        (service, images, artifacts)
    }

    fn message_for(record: &ImageRecord) -> Message {
        Message {
            offset: 1,
            key: record.id.to_string(),
            payload: serde_json::to_vec(record).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_handles_valid_job() {
        let (service, images, _) = setup();
        let saved = service
            .save_image(
                "a.png",
                &fixtures::png_bytes(40, 40),
                Action::Thumbnail(Dimensions::new(10, 10)),
            )
            .await
            .unwrap();
        let record = images.get(saved.id).unwrap().unwrap();

        ImageJobHandler::new(service)
            .handle(&message_for(&record))
            .await
            .unwrap();

        assert!(images.find_derived(saved.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_garbage_payload_is_permanent() {
        let (service, _, _) = setup();
        let message = Message {
            offset: 1,
            key: "k".to_string(),
            payload: b"{not json".to_vec(),
            created_at: Utc::now(),
        };

        let err = ImageJobHandler::new(service).handle(&message).await.unwrap_err();
        assert!(matches!(err, HandlerError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_undecodable_image_is_permanent() {
        let (service, images, _) = setup();
        let saved = service
            .save_image("a.png", b"not pixels", Action::Resize(Dimensions::new(5, 5)))
            .await
            .unwrap();
        let record = images.get(saved.id).unwrap().unwrap();

        let err = ImageJobHandler::new(service)
            .handle(&message_for(&record))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_storage_hiccup_is_transient() {
        let (service, images, artifacts) = setup();
        let saved = service
            .save_image(
                "a.png",
                &fixtures::png_bytes(20, 20),
                Action::Resize(Dimensions::new(5, 5)),
            )
            .await
            .unwrap();
        let record = images.get(saved.id).unwrap().unwrap();
        artifacts.fail_next_loads(1);

        let err = ImageJobHandler::new(service)
            .handle(&message_for(&record))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Transient(_)));
    }
}
