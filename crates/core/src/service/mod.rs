//! Orchestration service tying uploads, jobs and retrieval together.

mod error;
mod handler;
mod image_service;
mod reconciler;

pub use error::ServiceError;
pub use handler::ImageJobHandler;
pub use image_service::{ImageService, SavedImage};
pub use reconciler::Reconciler;
