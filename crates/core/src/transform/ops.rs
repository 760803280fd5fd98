//! Raster operations, independent of storage.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use super::error::TransformError;
use super::watermark::apply_watermark;
use crate::images::Action;

/// Scale to exactly `width` x `height`, ignoring the source aspect ratio.
pub fn resize_exact(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Scale preserving aspect ratio until the target is covered, then
/// center-crop to exactly `width` x `height`.
pub fn thumbnail_fill(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_to_fill(width, height, FilterType::Lanczos3)
}

/// Render `text` at the bottom-right corner. Output keeps the source size.
pub fn watermark(img: &DynamicImage, text: &str) -> DynamicImage {
    let mut canvas = img.to_rgb8();
    apply_watermark(&mut canvas, text);
    DynamicImage::ImageRgb8(canvas)
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, TransformError> {
    image::load_from_memory(bytes).map_err(|e| TransformError::Decode(e.to_string()))
}

/// Encode as baseline JPEG, dropping any alpha channel.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, TransformError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| TransformError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode `source`, apply exactly one operation and encode the result.
pub fn apply_action(source: &[u8], action: &Action, quality: u8) -> Result<Vec<u8>, TransformError> {
    action.validate()?;
    let img = decode(source)?;

    let output = match action {
        Action::Resize(dims) => resize_exact(&img, dims.width, dims.height),
        Action::Thumbnail(dims) => thumbnail_fill(&img, dims.width, dims.height),
        Action::Watermark(params) => watermark(&img, params.effective_text()),
    };

    encode_jpeg(&output, quality)
}
