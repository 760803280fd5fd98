//! Image record storage trait and types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::{ImageRecord, ImageStatus, NewImage};

/// Error type for image record operations.
#[derive(Debug, Error)]
pub enum ImageStoreError {
    /// Record not found.
    #[error("Image not found: {0}")]
    NotFound(String),
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl ImageStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ImageStoreError::Database(_))
    }
}

/// Filter for querying image records.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    /// Filter by status.
    pub status: Option<ImageStatus>,
    /// Only records without an `original_id`.
    pub originals_only: bool,
    /// Only records created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl ImageFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            originals_only: false,
            created_before: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: ImageStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn originals_only(mut self) -> Self {
        self.originals_only = true;
        self
    }

    pub fn with_created_before(mut self, instant: DateTime<Utc>) -> Self {
        self.created_before = Some(instant);
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for image record storage backends.
///
/// Implementations must make every single-record operation atomic; the
/// service calls them concurrently from request handlers and the consumer.
pub trait ImageStore: Send + Sync {
    /// Insert a record, assigning a fresh id and creation time.
    fn insert(&self, image: NewImage) -> Result<ImageRecord, ImageStoreError>;

    /// Get a record by id.
    fn get(&self, id: Uuid) -> Result<Option<ImageRecord>, ImageStoreError>;

    /// Delete a record, returning it.
    fn delete(&self, id: Uuid) -> Result<ImageRecord, ImageStoreError>;

    /// Overwrite a record's status.
    fn update_status(&self, id: Uuid, status: ImageStatus)
        -> Result<ImageRecord, ImageStoreError>;

    /// The derived record produced from `original_id`, if any.
    fn find_derived(&self, original_id: Uuid) -> Result<Option<ImageRecord>, ImageStoreError>;

    /// List records matching the filter, oldest first.
    fn list(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>, ImageStoreError>;

    /// Count records matching the filter (limit/offset ignored).
    fn count(&self, filter: &ImageFilter) -> Result<i64, ImageStoreError>;
}
