//! Host-supplied key/value blob storage.
//!
//! [`BlobStore`] is the only dependency of the asset store. Keys are
//! `<namespace>/<name>` strings; values are opaque bytes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the backing namespace. Must be idempotent and never discard
    /// existing data.
    async fn init(&self) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys starting with `prefix`, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

/// Namespace name reported by [`MemoryBlobStore`] before `init`.
const MEMORY_NAMESPACE: &str = "memory";

/// In-process blob store, used by tests and as a scratch store.
///
/// Supports an optional byte quota and injecting transient failures.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    /// `None` until the namespace is created.
    entries: RwLock<Option<HashMap<String, Vec<u8>>>>,
    quota_bytes: Option<u64>,
    pending_faults: AtomicU32,
}

impl MemoryBlobStore {
    /// An initialized, unbounded store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Some(HashMap::new())),
            quota_bytes: None,
            pending_faults: AtomicU32::new(0),
        }
    }

    /// A store whose namespace does not exist yet.
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Make the next `count` operations fail with `Unavailable`.
    pub fn inject_faults(&self, count: u32) {
        self.pending_faults.store(count, Ordering::SeqCst);
    }

    /// Total bytes currently stored.
    pub async fn used_bytes(&self) -> u64 {
        self.entries
            .read()
            .await
            .as_ref()
            .map(|m| m.values().map(|v| v.len() as u64).sum())
            .unwrap_or(0)
    }

    fn take_fault(&self) -> Result<(), StorageError> {
        let taken = self
            .pending_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Err(StorageError::Unavailable("injected fault".to_string())),
            Err(_) => Ok(()),
        }
    }
}

fn not_initialized() -> StorageError {
    StorageError::NotInitialized(MEMORY_NAMESPACE.to_string())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn init(&self) -> Result<(), StorageError> {
        self.entries.write().await.get_or_insert_with(HashMap::new);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.take_fault()?;
        let entries = self.entries.read().await;
        let map = entries.as_ref().ok_or_else(not_initialized)?;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.take_fault()?;
        let mut entries = self.entries.write().await;
        let map = entries.as_mut().ok_or_else(not_initialized)?;

        if let Some(quota) = self.quota_bytes {
            let used: u64 = map
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let requested = value.len() as u64;
            if used + requested > quota {
                return Err(StorageError::QuotaExceeded {
                    requested,
                    available: quota.saturating_sub(used),
                });
            }
        }

        map.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.take_fault()?;
        let mut entries = self.entries.write().await;
        entries.as_mut().ok_or_else(not_initialized)?.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.take_fault()?;
        let entries = self.entries.read().await;
        let map = entries.as_ref().ok_or_else(not_initialized)?;
        Ok(map.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
