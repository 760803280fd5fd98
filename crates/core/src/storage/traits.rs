//! Trait definitions for the artifact store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Logical path, `<namespace>/<key>`.
    pub path: String,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content.
    pub sha256: String,
}

/// Blob storage addressed by logical path.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Writes `bytes` under `<namespace>/<key>`, replacing any previous
    /// content. The artifact is only visible once fully written.
    async fn save(
        &self,
        namespace: &str,
        key: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StorageError>;

    /// Reads the artifact at a logical path returned by `save`.
    async fn load(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes the artifact at a logical path.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Longest filename `sanitize_filename` returns, in bytes.
pub const MAX_FILENAME_BYTES: usize = 100;

/// Longer suffixes are not treated as an extension when truncating.
const MAX_EXTENSION_BYTES: usize = 16;

/// Turns an uploaded filename into a single safe path component of at most
/// [`MAX_FILENAME_BYTES`], keeping the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        truncate_filename(cleaned)
    }
}

fn truncate_filename(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name, ""),
    };

    let mut end = (MAX_FILENAME_BYTES - ext.len()).min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], ext)
}

/// Last path component of a logical artifact path.
pub fn artifact_key(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
