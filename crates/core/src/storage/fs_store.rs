//! File system artifact store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::StorageError;
use super::traits::{ArtifactStore, StoredArtifact};

/// Stores artifacts as files under `<base_dir>/<namespace>/<key>`.
pub struct FsArtifactStore {
    base_dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Maps a logical path to a file below `base_dir`.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if path.is_empty() {
            return Err(StorageError::invalid_key(path, "empty path"));
        }

        let mut resolved = self.base_dir.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                _ => {
                    return Err(StorageError::invalid_key(
                        path,
                        "path must stay inside the storage root",
                    ))
                }
            }
        }
        Ok(resolved)
    }

    fn validate_component(kind: &str, value: &str) -> Result<(), StorageError> {
        if value.is_empty() || value == "." || value == ".." {
            return Err(StorageError::invalid_key(
                value,
                format!("{} must be a plain name", kind),
            ));
        }
        if value.contains(['/', '\\', '\0']) {
            return Err(StorageError::invalid_key(
                value,
                format!("{} must not contain path separators", kind),
            ));
        }
        Ok(())
    }

    async fn write_atomically(&self, target: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
        let dir = target.parent().unwrap_or(&self.base_dir);
        fs::create_dir_all(dir).await?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, target).await
        }
        .await;

        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %e, "Failed to remove temporary artifact");
                }
            }
        }
        result
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn save(
        &self,
        namespace: &str,
        key: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StorageError> {
        Self::validate_component("namespace", namespace)?;
        Self::validate_component("key", key)?;

        let logical = format!("{}/{}", namespace, key);
        let target = self.resolve(&logical)?;

        self.write_atomically(&target, bytes)
            .await
            .map_err(|e| StorageError::Io {
                path: logical.clone(),
                source: e,
            })?;

        let sha256 = format!("{:x}", Sha256::digest(bytes));
        debug!(path = %logical, size = bytes.len(), "Stored artifact");

        Ok(StoredArtifact {
            path: logical,
            size_bytes: bytes.len() as u64,
            sha256,
        })
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let file = self.resolve(path)?;
        fs::read(&file).await.map_err(|e| StorageError::io(path, e))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let file = self.resolve(path)?;
        fs::remove_file(&file)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        debug!(path = %path, "Deleted artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_store() -> (TempDir, FsArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (dir, store) = create_store();

        let stored = store.save("original", "abc-cat.png", b"pixels").await.unwrap();
        assert_eq!(stored.path, "original/abc-cat.png");
        assert_eq!(stored.size_bytes, 6);
        assert_eq!(stored.sha256.len(), 64);
        assert!(dir.path().join("original").join("abc-cat.png").exists());

        let bytes = store.load(&stored.path).await.unwrap();
        assert_eq!(bytes, b"pixels");
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let (_dir, store) = create_store();

        store.save("resized", "a.jpg", b"first").await.unwrap();
        store.save("resized", "a.jpg", b"second").await.unwrap();

        assert_eq!(store.load("resized/a.jpg").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_no_temporary_files_left() {
        let (dir, store) = create_store();
        store.save("thumbnails", "t.jpg", b"data").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("thumbnails"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["t.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let (_dir, store) = create_store();
        let err = store.load("original/missing.png").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = create_store();
        let stored = store.save("original", "x.png", b"x").await.unwrap();

        store.delete(&stored.path).await.unwrap();
        assert!(store.load(&stored.path).await.unwrap_err().is_not_found());
        assert!(store.delete(&stored.path).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let (_dir, store) = create_store();

        let err = store.save("original", "../escape", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));

        let err = store.save("..", "file", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));

        let err = store.load("../outside.png").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));

        let err = store.delete("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }
}
