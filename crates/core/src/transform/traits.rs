//! Trait definitions for the transformation engine.

use async_trait::async_trait;

use super::error::TransformError;
use crate::images::{ImageRecord, NewImage};

/// Produces the derived variant of an image record.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Loads the source artifact, applies the record's action, stores the
    /// result and returns the derived record to insert.
    async fn process(&self, image: &ImageRecord) -> Result<NewImage, TransformError>;
}
