//! Transformation engine: resize, thumbnail and watermark.

mod engine;
mod error;
mod ops;
mod traits;
mod watermark;

pub use engine::ImageEngine;
pub use error::TransformError;
pub use ops::{apply_action, decode, encode_jpeg, resize_exact, thumbnail_fill, watermark};
pub use traits::Transformer;
pub use watermark::{apply_watermark, layout_watermark, WatermarkLayout, MARGIN};
