//! In-memory artifact store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::storage::{ArtifactStore, StorageError, StoredArtifact};

/// Mock implementation of the ArtifactStore trait.
///
/// Provides controllable behavior for testing:
/// - Inspect and seed stored blobs
/// - Count loads and saves
/// - Inject transient I/O failures
#[derive(Debug, Default)]
pub struct MockArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    failing_loads: AtomicU32,
    failing_saves: AtomicU32,
    failing_deletes: AtomicU32,
}

impl MockArtifactStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob at `path`.
    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.blobs.write().unwrap().insert(path.to_string(), bytes);
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().unwrap().get(path).cloned()
    }

    /// Drop a blob behind the service's back.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.write().unwrap().remove(path)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Fail the next `n` loads with a retryable I/O error.
    pub fn fail_next_loads(&self, n: u32) {
        self.failing_loads.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` saves with a retryable I/O error.
    pub fn fail_next_saves(&self, n: u32) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` deletes with a retryable I/O error.
    pub fn fail_next_deletes(&self, n: u32) {
        self.failing_deletes.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32, path: &str) -> Result<(), StorageError> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            Err(StorageError::Io {
                path: path.to_string(),
                source: std::io::Error::other("injected failure"),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn save(
        &self,
        namespace: &str,
        key: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StorageError> {
        let path = format!("{}/{}", namespace, key);
        Self::take_failure(&self.failing_saves, &path)?;
        self.saves.fetch_add(1, Ordering::SeqCst);

        let sha256 = format!("{:x}", Sha256::digest(bytes));
        self.blobs
            .write()
            .unwrap()
            .insert(path.clone(), bytes.to_vec());

        Ok(StoredArtifact {
            path,
            size_bytes: bytes.len() as u64,
            sha256,
        })
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Self::take_failure(&self.failing_loads, path)?;
        self.get(path).ok_or_else(|| StorageError::NotFound {
            path: path.to_string(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        Self::take_failure(&self.failing_deletes, path)?;
        match self.remove(path) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}
