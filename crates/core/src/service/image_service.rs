//! Image lifecycle: upload, asynchronous processing, retrieval, deletion.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::ServiceError;
use crate::images::{Action, ImageFilter, ImageRecord, ImageStatus, ImageStore, NewImage};
use crate::metrics;
use crate::queue::{DeadLetterIndex, JobProducer};
use crate::storage::{sanitize_filename, ArtifactStore, ORIGINAL_NAMESPACE};
use crate::transform::Transformer;

/// Upper bound on records re-enqueued per reconciliation sweep, and the
/// page size used while scanning for them.
const RECONCILE_BATCH: i64 = 100;

/// Response to a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedImage {
    pub id: Uuid,
    pub filename: String,
    pub path: String,
}

/// Glues the record store, artifact store, queue and engine together.
pub struct ImageService {
    images: Arc<dyn ImageStore>,
    artifacts: Arc<dyn ArtifactStore>,
    producer: Arc<dyn JobProducer>,
    transformer: Arc<dyn Transformer>,
    dead_letters: Option<Arc<dyn DeadLetterIndex>>,
}

impl ImageService {
    pub fn new(
        images: Arc<dyn ImageStore>,
        artifacts: Arc<dyn ArtifactStore>,
        producer: Arc<dyn JobProducer>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            images,
            artifacts,
            producer,
            transformer,
            dead_letters: None,
        }
    }

    /// Let the reconciliation sweep skip jobs the consumer already gave up on.
    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterIndex>) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Store the original, record it as pending and enqueue its job.
    ///
    /// If the job cannot be enqueued the record is marked `failed` and the
    /// error is returned.
    pub async fn save_image(
        &self,
        filename: &str,
        bytes: &[u8],
        action: Action,
    ) -> Result<SavedImage, ServiceError> {
        if filename.trim().is_empty() {
            return Err(ServiceError::Validation("filename is required".to_string()));
        }
        if bytes.is_empty() {
            return Err(ServiceError::Validation("image is empty".to_string()));
        }
        action.validate()?;

        let action_name = action.name();
        let key = format!("{}-{}", Uuid::new_v4().simple(), sanitize_filename(filename));
        let stored = self.artifacts.save(ORIGINAL_NAMESPACE, &key, bytes).await?;

        let record = match self
            .images
            .insert(NewImage::original(filename, stored.path.clone(), action))
        {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = self.artifacts.delete(&stored.path).await {
                    warn!(path = %stored.path, "Failed to remove unreferenced upload: {}", cleanup);
                }
                metrics::UPLOADS_TOTAL
                    .with_label_values(&[action_name, "failed"])
                    .inc();
                return Err(e.into());
            }
        };

        if let Err(e) = self.producer.enqueue(&record).await {
            error!(id = %record.id, "Could not schedule image job: {}", e);
            if let Err(mark) = self.images.update_status(record.id, ImageStatus::Failed) {
                error!(id = %record.id, "Failed to mark image as failed: {}", mark);
            }
            metrics::UPLOADS_TOTAL
                .with_label_values(&[action_name, "failed"])
                .inc();
            return Err(e.into());
        }

        metrics::UPLOADS_TOTAL
            .with_label_values(&[action_name, "success"])
            .inc();
        info!(id = %record.id, filename = %record.filename, action = action_name, "Image saved");

        Ok(SavedImage {
            id: record.id,
            filename: record.filename,
            path: record.path,
        })
    }

    /// Run the job's transformation and insert the derived record.
    ///
    /// Idempotent: a job whose derived record already exists returns that
    /// record's id without transforming again.
    pub async fn process_image(&self, job: &ImageRecord) -> Result<Uuid, ServiceError> {
        if let Some(existing) = self.images.find_derived(job.id)? {
            debug!(id = %job.id, derived = %existing.id, "Job already processed");
            return Ok(existing.id);
        }

        let derived = self.transformer.process(job).await?;
        let record = self.images.insert(derived)?;

        info!(id = %job.id, derived = %record.id, path = %record.path, "Image processed");
        Ok(record.id)
    }

    /// Record plus artifact bytes.
    pub async fn get_image(&self, id: Uuid) -> Result<(ImageRecord, Vec<u8>), ServiceError> {
        let record = self.get_meta(id)?;

        match self.artifacts.load(&record.path).await {
            Ok(bytes) => Ok((record, bytes)),
            Err(e) if e.is_not_found() => {
                warn!(id = %id, path = %record.path, "Record has no artifact");
                Err(ServiceError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_meta(&self, id: Uuid) -> Result<ImageRecord, ServiceError> {
        self.images.get(id)?.ok_or(ServiceError::NotFound(id))
    }

    /// Delete the record, then its artifact. An artifact that is already
    /// gone is ignored.
    pub async fn delete_image(&self, id: Uuid) -> Result<ImageRecord, ServiceError> {
        let record = self.images.delete(id).map_err(|e| match e {
            crate::images::ImageStoreError::NotFound(_) => ServiceError::NotFound(id),
            other => other.into(),
        })?;

        match self.artifacts.delete(&record.path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(id = %id, path = %record.path, "Artifact already missing");
            }
            Err(e) => {
                error!(id = %id, path = %record.path, "Record deleted but artifact left behind: {}", e);
                return Err(e.into());
            }
        }

        info!(id = %id, "Image deleted");
        Ok(record)
    }

    /// Re-enqueue pending originals older than `stale_after` that never
    /// produced a derived record. Returns how many were re-enqueued.
    ///
    /// Jobs that were dead-lettered are left alone; the original stays
    /// pending and only its dead letter records the failure.
    pub async fn reconcile_pending(&self, stale_after: Duration) -> Result<usize, ServiceError> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        let requeued = self
            .requeue_stale(Utc::now() - stale_after, RECONCILE_BATCH)
            .await?;

        metrics::RECONCILED_JOBS.inc_by(requeued as u64);
        Ok(requeued)
    }

    /// Scan stale pending originals page by page until `limit` jobs were
    /// re-enqueued or the candidates run out.
    async fn requeue_stale(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<usize, ServiceError> {
        let mut requeued = 0;
        let mut offset = 0;

        loop {
            let filter = ImageFilter::new()
                .with_status(ImageStatus::Pending)
                .originals_only()
                .with_created_before(cutoff)
                .with_limit(limit)
                .with_offset(offset);
            let page = self.images.list(&filter)?;
            let fetched = page.len() as i64;

            for record in page {
                if requeued as i64 >= limit {
                    return Ok(requeued);
                }
                if self.images.find_derived(record.id)?.is_some() {
                    continue;
                }
                if self.is_dead_lettered(&record)? {
                    debug!(id = %record.id, "Skipping dead-lettered image");
                    continue;
                }
                match self.producer.enqueue(&record).await {
                    Ok(_) => {
                        info!(id = %record.id, "Re-enqueued stale pending image");
                        requeued += 1;
                    }
                    Err(e) => warn!(id = %record.id, "Reconciliation enqueue failed: {}", e),
                }
            }

            if fetched < limit {
                return Ok(requeued);
            }
            offset += fetched;
        }
    }

    fn is_dead_lettered(&self, record: &ImageRecord) -> Result<bool, ServiceError> {
        match &self.dead_letters {
            Some(index) => Ok(index.is_dead_lettered(&record.id.to_string())?),
            None => Ok(false),
        }
    }

    /// Number of records per status.
    pub fn status_counts(&self) -> Result<Vec<(ImageStatus, i64)>, ServiceError> {
        ImageStatus::ALL
            .iter()
            .map(|status| -> Result<(ImageStatus, i64), ServiceError> {
                let count = self.images.count(&ImageFilter::new().with_status(*status))?;
                Ok((*status, count))
            })
            .collect()
    }
}
