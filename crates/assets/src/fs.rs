//! Filesystem-backed blob store.
//!
//! Each key `<namespace>/<name>` maps to the file `<root>/<namespace>/<name>`.
//! Writes go to a temporary sibling first and are renamed into place so a
//! crash never leaves a half-written value under the real key.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::blob::BlobStore;
use crate::error::StorageError;

/// Suffix of in-flight temporary files; never listed.
const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    quota_bytes: Option<u64>,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota_bytes: None,
        }
    }

    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root, rejecting traversal.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.ends_with(TMP_SUFFIX)
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_root(&self) -> Result<(), StorageError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotInitialized(
                self.root.display().to_string(),
            )),
            Err(e) => Err(map_io_error(e, 0)),
        }
    }

    /// Sum of all stored file sizes, skipping `exclude`.
    async fn used_bytes(&self, exclude: &Path) -> Result<u64, StorageError> {
        let mut total = 0u64;
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                } else if path != exclude {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}

#[cfg(unix)]
fn is_disk_full(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(libc::ENOSPC)
}

#[cfg(not(unix))]
fn is_disk_full(_error: &std::io::Error) -> bool {
    false
}

/// Map an I/O error to a storage error, recognising a full disk.
fn map_io_error(error: std::io::Error, requested: u64) -> StorageError {
    if is_disk_full(&error) {
        return StorageError::QuotaExceeded {
            requested,
            available: 0,
        };
    }

    match error.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            StorageError::Unavailable(error.to_string())
        }
        _ => StorageError::Io(error),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| map_io_error(e, 0))?;
        tracing::info!(root = %self.root.display(), "Blob store directory ready");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure_root().await?;
                Ok(None)
            }
            Err(e) => Err(map_io_error(e, 0)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        self.ensure_root().await?;
        let requested = value.len() as u64;

        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes(&path).await?;
            if used + requested > quota {
                return Err(StorageError::QuotaExceeded {
                    requested,
                    available: quota.saturating_sub(used),
                });
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io_error(e, requested))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        if let Err(e) = tokio::fs::write(&tmp, &value).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(map_io_error(e, requested));
        }
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| map_io_error(e, requested))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => self.ensure_root().await,
            Err(e) => Err(map_io_error(e, 0)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.ensure_root().await?;

        // Keys are `<namespace>/<name>`; only the namespace directory of the
        // prefix needs scanning.
        let (dir_part, name_prefix) = match prefix.rsplit_once('/') {
            Some((dir, rest)) => (Some(dir), rest),
            None => (None, prefix),
        };
        let dir = match dir_part {
            Some(dir) => self.path_for(dir)?,
            None => self.root.clone(),
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(map_io_error(e, 0)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) || !name.starts_with(name_prefix) {
                continue;
            }
            keys.push(match dir_part {
                Some(dir) => format!("{dir}/{name}"),
                None => name,
            });
        }
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
