//! Artifact storage for original and derived image bytes.

mod error;
mod fs_store;
mod traits;

pub use error::StorageError;
pub use fs_store::FsArtifactStore;
pub use traits::{
    artifact_key, sanitize_filename, ArtifactStore, StoredArtifact, MAX_FILENAME_BYTES,
};

/// Namespace holding uploaded originals.
pub const ORIGINAL_NAMESPACE: &str = "original";
