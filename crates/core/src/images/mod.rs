//! Image records and their persistence.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteImageStore;
pub use store::{ImageFilter, ImageStore, ImageStoreError};
pub use types::{
    Action, ActionError, Dimensions, ImageRecord, ImageStatus, NewImage, WatermarkParams,
    DEFAULT_WATERMARK_TEXT, MAX_DIMENSION,
};
