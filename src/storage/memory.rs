//! In-memory blob store.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use super::{AccountInfo, BlobItem, BlobStore, ContainerInfo, StorageError, StorageResult};

/// In-memory blob store (for testing).
///
/// Containers and blobs are kept in sorted order so enumeration is
/// deterministic. Individual containers or blobs can be marked as failing to
/// exercise error paths.
#[derive(Default)]
pub struct MemoryBlobStore {
    containers: Mutex<BTreeMap<String, BTreeMap<String, BlobItem>>>,
    failing_listings: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<(String, String)>>,
    /// Blobs reported by listings but already gone when deleted.
    vanished: Mutex<Vec<(String, String)>>,
    unreachable: bool,
    delete_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose account probe fails, as if credentials were rejected.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Create an empty container.
    pub fn add_container(&self, container: &str) {
        self.lock_containers()
            .entry(container.to_string())
            .or_default();
    }

    /// Insert or replace a blob, creating its container when needed.
    pub fn insert(&self, container: &str, blob: BlobItem) {
        self.lock_containers()
            .entry(container.to_string())
            .or_default()
            .insert(blob.name.clone(), blob);
    }

    /// Make listing `container` fail.
    pub fn fail_listing(&self, container: &str) {
        lock(&self.failing_listings).push(container.to_string());
    }

    /// Make deleting `container/blob` fail with a server error.
    pub fn fail_delete(&self, container: &str, blob: &str) {
        lock(&self.failing_deletes).push((container.to_string(), blob.to_string()));
    }

    /// Simulate another process removing `container/blob` between listing and delete.
    pub fn vanish_before_delete(&self, container: &str, blob: &str) {
        lock(&self.vanished).push((container.to_string(), blob.to_string()));
    }

    /// Whether `container/blob` currently exists.
    pub fn contains(&self, container: &str, blob: &str) -> bool {
        self.lock_containers()
            .get(container)
            .is_some_and(|blobs| blobs.contains_key(blob))
    }

    /// Number of blobs in `container`.
    pub fn blob_count(&self, container: &str) -> usize {
        self.lock_containers()
            .get(container)
            .map_or(0, |blobs| blobs.len())
    }

    /// Number of delete calls received, successful or not.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn lock_containers(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<String, BlobItem>>> {
        lock(&self.containers)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned lock only means a test panicked mid-update; the data is still usable.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn account_info(&self) -> StorageResult<AccountInfo> {
        if self.unreachable {
            return Err(StorageError::Auth(
                "memory store configured as unreachable".to_string(),
            ));
        }
        Ok(AccountInfo {
            sku_name: "Memory".to_string(),
            account_kind: "StorageV2".to_string(),
        })
    }

    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        Ok(self
            .lock_containers()
            .keys()
            .map(|name| ContainerInfo { name: name.clone() })
            .collect())
    }

    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<BlobItem>> {
        if lock(&self.failing_listings).iter().any(|c| c == container) {
            return Err(StorageError::Http {
                status: 403,
                code: "AuthorizationPermissionMismatch".to_string(),
                message: format!("listing {} is not permitted", container),
            });
        }

        // BTreeMap iteration is already name-ordered.
        Ok(self
            .lock_containers()
            .get(container)
            .ok_or_else(|| StorageError::NotFound(container.to_string()))?
            .values()
            .cloned()
            .collect())
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if lock(&self.failing_deletes)
            .iter()
            .any(|(c, b)| c == container && b == blob)
        {
            return Err(StorageError::Http {
                status: 500,
                code: "InternalError".to_string(),
                message: "simulated server failure".to_string(),
            });
        }

        let vanished = lock(&self.vanished)
            .iter()
            .any(|(c, b)| c == container && b == blob);

        let mut containers = self.lock_containers();
        let removed = containers
            .get_mut(container)
            .and_then(|blobs| blobs.remove(blob));

        match removed {
            Some(_) if !vanished => Ok(()),
            _ => Err(StorageError::NotFound(format!("{}/{}", container, blob))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
