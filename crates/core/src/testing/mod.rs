//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the artifact store and the queue producer so the
//! service and engine can be exercised without touching disk or SQLite.
//!
//! # Example
//!
//! ```rust,ignore
//! use imgqueue_core::testing::{fixtures, MockArtifactStore, RecordingProducer};
//!
//! let artifacts = MockArtifactStore::new();
//! artifacts.insert("original/a.png", fixtures::png_bytes(64, 48));
//! artifacts.fail_next_saves(1);
//!
//! let producer = RecordingProducer::new();
//! // ... build an ImageService, then inspect producer.enqueued_ids()
//! ```

mod mock_artifact_store;
mod mock_producer;

pub use mock_artifact_store::MockArtifactStore;
pub use mock_producer::{FlakyProducer, RecordingProducer};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    /// Diagonal gradient so resampling has something to chew on.
    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, 128])
        })
    }

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).expect("fixture encode");
        out.into_inner()
    }

    /// An RGB PNG of the given size.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
    }

    /// A baseline JPEG of the given size.
    pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
    }

    /// A half-transparent RGBA PNG of the given size.
    pub fn rgba_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 128]));
        encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }
}
