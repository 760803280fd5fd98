//! Storage-backed transformation engine.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use super::error::TransformError;
use super::ops::apply_action;
use super::traits::Transformer;
use crate::config::TransformConfig;
use crate::images::{ImageRecord, NewImage};
use crate::storage::{artifact_key, ArtifactStore};

/// Loads the source artifact, runs the raster work on the blocking pool and
/// writes the derived artifact under the action's namespace.
pub struct ImageEngine {
    storage: Arc<dyn ArtifactStore>,
    jpeg_quality: u8,
}

impl ImageEngine {
    pub fn new(storage: Arc<dyn ArtifactStore>, config: &TransformConfig) -> Self {
        Self {
            storage,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

#[async_trait]
impl Transformer for ImageEngine {
    async fn process(&self, image: &ImageRecord) -> Result<NewImage, TransformError> {
        image.action.validate()?;

        let start = Instant::now();
        let source = self.storage.load(&image.path).await?;
        debug!(id = %image.id, path = %image.path, size = source.len(), "Loaded source artifact");

        let action = image.action.clone();
        let quality = self.jpeg_quality;
        let output = tokio::task::spawn_blocking(move || apply_action(&source, &action, quality))
            .await
            .map_err(|e| TransformError::Task(e.to_string()))??;

        let stored = self
            .storage
            .save(image.action.namespace(), artifact_key(&image.path), &output)
            .await?;

        info!(
            id = %image.id,
            action = image.action.name(),
            path = %stored.path,
            size = stored.size_bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transformed image"
        );

        Ok(NewImage::derived(image, stored.path))
    }
}
