//! The asset store: typed media records over a [`BlobStore`].
//!
//! Each asset is persisted as two keys, `blob/<id>` (payload) and
//! `meta/<id>` (JSON [`AssetRecord`]). The metadata key is written last and
//! removed first, so it acts as the commit marker.
//!
//! Access handles are cached per asset and tied to the record's
//! `updatedAt`. Delete and payload overwrite revoke the cached handle before
//! touching storage, so a stale handle is never returned.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use pov_core::types::{new_id, AssetId, Timestamp};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::blob::BlobStore;
use crate::error::{AssetError, StorageError};
use crate::handle::AccessHandle;
use crate::imaging::{
    process_image, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_IMAGE_HEIGHT, DEFAULT_MAX_IMAGE_WIDTH,
};
use crate::metadata::{
    normalize_mime, AssetFilter, AssetKind, AssetRecord, AssetUpdate, Dimensions, NewAsset,
};
use crate::probe::MediaProbe;
use crate::retry::{next_delay, RetryConfig};

const META_PREFIX: &str = "meta/";
const BLOB_PREFIX: &str = "blob/";

fn meta_key(id: &str) -> String {
    format!("{META_PREFIX}{id}")
}

fn blob_key(id: &str) -> String {
    format!("{BLOB_PREFIX}{id}")
}

// ---------------------------------------------------------------------------
// Configuration and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AssetStoreConfig {
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub jpeg_quality: u8,
    pub retry: RetryConfig,
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            max_image_width: DEFAULT_MAX_IMAGE_WIDTH,
            max_image_height: DEFAULT_MAX_IMAGE_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            retry: RetryConfig::default(),
        }
    }
}

/// Metadata plus a live access handle.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub metadata: AssetRecord,
    pub handle: AccessHandle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub asset_count: usize,
    pub total_bytes: u64,
}

/// A cached handle and the record version it was minted for.
struct CachedHandle {
    handle: AccessHandle,
    version: Timestamp,
}

/// Payload and derived fields ready to persist.
struct PreparedPayload {
    bytes: Vec<u8>,
    mime_type: String,
    duration: Option<f64>,
    dimensions: Option<Dimensions>,
}

/// What [`AssetStore::persist`] writes under `blob/<id>`.
enum PayloadWrite {
    /// Metadata only.
    Keep,
    /// First payload of a new asset.
    Create(Vec<u8>),
    /// Overwrite of an existing payload; `previous` is restored if the
    /// metadata commit fails.
    Replace {
        bytes: Vec<u8>,
        previous: Option<Vec<u8>>,
    },
}

impl PayloadWrite {
    fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Keep => None,
            Self::Create(bytes) | Self::Replace { bytes, .. } => Some(bytes),
        }
    }
}

// ---------------------------------------------------------------------------
// AssetStore
// ---------------------------------------------------------------------------

/// Durable asset storage with an ephemeral handle cache.
///
/// Construct once at the composition root and share via `Arc<AssetStore>`.
pub struct AssetStore {
    store: Arc<dyn BlobStore>,
    probe: Arc<dyn MediaProbe>,
    config: AssetStoreConfig,
    handles: RwLock<HashMap<AssetId, CachedHandle>>,
}

impl AssetStore {
    pub fn new(
        store: Arc<dyn BlobStore>,
        probe: Arc<dyn MediaProbe>,
        config: AssetStoreConfig,
    ) -> Self {
        Self {
            store,
            probe,
            config,
            handles: RwLock::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Store a new asset and mint its access handle.
    ///
    /// Unsupported MIME types are rejected before any storage access.
    pub async fn put(&self, bytes: Vec<u8>, new: NewAsset) -> Result<StoredAsset, AssetError> {
        let kind = AssetKind::from_mime(&new.mime_type)?;
        let prepared = self
            .prepare_payload(kind, bytes, &new.mime_type, new.duration, new.dimensions)
            .await?;

        let now = Utc::now();
        let record = AssetRecord {
            id: new_id(),
            kind,
            mime_type: prepared.mime_type,
            name: new.name,
            size: prepared.bytes.len() as u64,
            created_at: now,
            updated_at: now,
            tags: new.tags,
            duration: prepared.duration,
            dimensions: prepared.dimensions,
        };

        self.persist(&record, PayloadWrite::Create(prepared.bytes.clone()))
            .await?;
        let handle = self.cache_handle(&record, prepared.bytes).await;

        tracing::info!(
            asset_id = %record.id,
            kind = kind.name(),
            size = record.size,
            "Asset stored",
        );
        Ok(StoredAsset {
            metadata: record,
            handle,
        })
    }

    /// Metadata plus an access handle, reusing the cached handle when it is
    /// still valid for the persisted record.
    pub async fn get(&self, id: &str) -> Result<StoredAsset, AssetError> {
        let record = self.require_metadata(id).await?;

        if let Some(cached) = self.handles.read().await.get(id) {
            if cached.handle.is_valid() && cached.version == record.updated_at {
                return Ok(StoredAsset {
                    handle: cached.handle.clone(),
                    metadata: record,
                });
            }
        }

        let key = blob_key(id);
        let bytes = self
            .with_retry("get", || self.store.get(&key))
            .await?
            .ok_or_else(|| {
                tracing::warn!(asset_id = id, "Asset metadata present but payload missing");
                AssetError::NotFound(id.to_string())
            })?;

        let handle = self.cache_handle(&record, bytes).await;
        Ok(StoredAsset {
            metadata: record,
            handle,
        })
    }

    /// Metadata only; no handle is minted.
    pub async fn get_metadata(&self, id: &str) -> Result<AssetRecord, AssetError> {
        self.require_metadata(id).await
    }

    pub async fn exists(&self, id: &str) -> Result<bool, AssetError> {
        Ok(self.read_metadata(id).await?.is_some())
    }

    /// All records matching `filter`, oldest first.
    pub async fn list(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>, AssetError> {
        let keys = self.with_retry("list", || self.store.list(META_PREFIX)).await?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(id) = key.strip_prefix(META_PREFIX) else {
                continue;
            };
            match self.read_metadata(id).await {
                Ok(Some(record)) if filter.matches(&record) => records.push(record),
                Ok(_) => {}
                Err(AssetError::Storage(StorageError::Corrupt { key, reason })) => {
                    tracing::warn!(%key, %reason, "Skipping corrupt asset record");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Revoke the cached handle, then remove metadata and payload.
    pub async fn delete(&self, id: &str) -> Result<(), AssetError> {
        self.revoke_handle(id).await;

        if self.read_metadata(id).await?.is_none() {
            return Err(AssetError::NotFound(id.to_string()));
        }

        let meta = meta_key(id);
        let blob = blob_key(id);
        self.with_retry("delete", || self.store.delete(&meta)).await?;
        self.with_retry("delete", || self.store.delete(&blob)).await?;

        tracing::info!(asset_id = id, "Asset deleted");
        Ok(())
    }

    /// Overwrite an asset's payload, keeping its id and kind.
    ///
    /// The previous handle is revoked before storage is touched.
    pub async fn replace(
        &self,
        id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<StoredAsset, AssetError> {
        let kind = AssetKind::from_mime(mime_type)?;
        let mut record = self.require_metadata(id).await?;
        if kind != record.kind {
            return Err(AssetError::KindMismatch {
                id: id.to_string(),
                expected: record.kind.name(),
                actual: normalize_mime(mime_type),
            });
        }

        let prepared = self
            .prepare_payload(kind, bytes, mime_type, None, None)
            .await?;

        let key = blob_key(id);
        let previous = self.with_retry("get", || self.store.get(&key)).await?;

        self.revoke_handle(id).await;

        record.mime_type = prepared.mime_type;
        record.size = prepared.bytes.len() as u64;
        record.duration = prepared.duration;
        record.dimensions = prepared.dimensions;
        record.updated_at = next_timestamp(record.updated_at);

        let write = PayloadWrite::Replace {
            bytes: prepared.bytes.clone(),
            previous,
        };
        self.persist(&record, write).await?;
        let handle = self.cache_handle(&record, prepared.bytes).await;

        tracing::info!(asset_id = id, size = record.size, "Asset payload replaced");
        Ok(StoredAsset {
            metadata: record,
            handle,
        })
    }

    /// Edit name and tags. The payload and its handle are unaffected.
    pub async fn update_metadata(
        &self,
        id: &str,
        update: AssetUpdate,
    ) -> Result<AssetRecord, AssetError> {
        let mut record = self.require_metadata(id).await?;
        let previous_version = record.updated_at;

        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(tags) = update.tags {
            record.tags = tags;
        }
        record.updated_at = next_timestamp(previous_version);

        self.persist(&record, PayloadWrite::Keep).await?;

        // Same payload: carry the cached handle over to the new version.
        if let Some(cached) = self.handles.write().await.get_mut(id) {
            if cached.version == previous_version {
                cached.version = record.updated_at;
            }
        }

        tracing::debug!(asset_id = id, "Asset metadata updated");
        Ok(record)
    }

    pub async fn usage(&self) -> Result<StorageUsage, AssetError> {
        let records = self.list(&AssetFilter::default()).await?;
        Ok(StorageUsage {
            asset_count: records.len(),
            total_bytes: records.iter().map(|r| r.size).sum(),
        })
    }

    /// Revoke and drop every cached handle.
    pub async fn release_handles(&self) {
        let drained: Vec<CachedHandle> =
            self.handles.write().await.drain().map(|(_, c)| c).collect();
        for cached in &drained {
            cached.handle.revoke();
        }
        tracing::debug!(count = drained.len(), "Released cached access handles");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn prepare_payload(
        &self,
        kind: AssetKind,
        bytes: Vec<u8>,
        mime_type: &str,
        duration: Option<f64>,
        dimensions: Option<Dimensions>,
    ) -> Result<PreparedPayload, AssetError> {
        let mime_type = normalize_mime(mime_type);

        if kind == AssetKind::Image {
            let (max_w, max_h, quality) = (
                self.config.max_image_width,
                self.config.max_image_height,
                self.config.jpeg_quality,
            );
            let mime = mime_type.clone();
            let processed = tokio::task::spawn_blocking(move || {
                process_image(bytes, &mime, max_w, max_h, quality)
            })
            .await
            .map_err(|e| AssetError::Decode(format!("image task failed: {e}")))??;
            if processed.resized {
                tracing::debug!(
                    width = processed.dimensions.width,
                    height = processed.dimensions.height,
                    "Downsampled oversized image",
                );
            }

            return Ok(PreparedPayload {
                bytes: processed.bytes,
                mime_type: processed.mime_type,
                duration: None,
                dimensions: Some(processed.dimensions),
            });
        }

        let probed = if duration.is_some() && (dimensions.is_some() || kind == AssetKind::Audio) {
            Default::default()
        } else {
            match self.probe.probe(kind, &bytes).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, kind = kind.name(), "Media probe failed");
                    Default::default()
                }
            }
        };

        Ok(PreparedPayload {
            bytes,
            mime_type,
            duration: duration.or(probed.duration),
            dimensions: if kind == AssetKind::Video {
                dimensions.or(probed.dimensions)
            } else {
                None
            },
        })
    }

    /// Write the payload, then commit the metadata. If the commit fails the
    /// payload key is put back the way it was, so a record never describes
    /// bytes it was not written for.
    async fn persist(&self, record: &AssetRecord, write: PayloadWrite) -> Result<(), AssetError> {
        let meta = serde_json::to_vec(record).map_err(|e| StorageError::Corrupt {
            key: meta_key(&record.id),
            reason: e.to_string(),
        })?;

        let blob = blob_key(&record.id);
        if let Some(bytes) = write.bytes() {
            self.with_retry("put", || self.store.put(&blob, bytes.to_vec()))
                .await?;
        }

        let mkey = meta_key(&record.id);
        let Err(e) = self.with_retry("put", || self.store.put(&mkey, meta.clone())).await else {
            return Ok(());
        };

        let undo = match write {
            PayloadWrite::Keep => None,
            PayloadWrite::Create(_) | PayloadWrite::Replace { previous: None, .. } => {
                Some(self.store.delete(&blob).await)
            }
            PayloadWrite::Replace {
                previous: Some(previous),
                ..
            } => Some(self.with_retry("put", || self.store.put(&blob, previous.clone())).await),
        };
        if let Some(Err(undo_error)) = undo {
            tracing::warn!(
                asset_id = %record.id,
                error = %undo_error,
                "Failed to roll back payload after metadata write failure",
            );
        }
        Err(e.into())
    }

    async fn read_metadata(&self, id: &str) -> Result<Option<AssetRecord>, AssetError> {
        let key = meta_key(id);
        let Some(raw) = self.with_retry("get", || self.store.get(&key)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&raw).map_err(|e| StorageError::Corrupt {
            key,
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// Persisted metadata or `NotFound`. A missing record also evicts any
    /// handle still cached for the id.
    async fn require_metadata(&self, id: &str) -> Result<AssetRecord, AssetError> {
        match self.read_metadata(id).await? {
            Some(record) => Ok(record),
            None => {
                self.revoke_handle(id).await;
                Err(AssetError::NotFound(id.to_string()))
            }
        }
    }

    async fn cache_handle(&self, record: &AssetRecord, bytes: Vec<u8>) -> AccessHandle {
        let handle = AccessHandle::mint(&record.id, &record.mime_type, bytes);
        let previous = self.handles.write().await.insert(
            record.id.clone(),
            CachedHandle {
                handle: handle.clone(),
                version: record.updated_at,
            },
        );
        if let Some(previous) = previous {
            previous.handle.revoke();
        }
        tracing::debug!(asset_id = %record.id, url = handle.url(), "Access handle minted");
        handle
    }

    async fn revoke_handle(&self, id: &str) {
        if let Some(cached) = self.handles.write().await.remove(id) {
            cached.handle.revoke();
        }
    }

    /// Run a blob store operation, creating a missing namespace once and
    /// retrying transient failures with backoff. Data is never wiped.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let retry = &self.config.retry;
        let mut delay = retry.initial_delay;
        let mut attempt = 0u32;
        let mut initialized = false;

        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(StorageError::NotInitialized(namespace)) if !initialized => {
                    tracing::info!(%namespace, op, "Creating missing asset storage namespace");
                    self.store.init().await?;
                    initialized = true;
                }
                Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                    tracing::warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Storage unavailable, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, retry);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `now`, but strictly after `previous` so versions always move forward.
fn next_timestamp(previous: Timestamp) -> Timestamp {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
