//! Integration tests for the asset store.
//!
//! Covers the handle cache lifecycle and storage failure handling against
//! both the in-memory and the filesystem blob stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pov_assets::{
    AssetError, AssetFilter, AssetKind, AssetStore, AssetStoreConfig, BlobStore, FsBlobStore,
    MemoryBlobStore, NewAsset, NoopProbe, StorageError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn memory_store() -> (Arc<MemoryBlobStore>, AssetStore) {
    let blob = Arc::new(MemoryBlobStore::new());
    let store = AssetStore::new(blob.clone(), Arc::new(NoopProbe), AssetStoreConfig::default());
    (blob, store)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([0, 128, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

// ---------------------------------------------------------------------------
// Handle cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_after_delete_is_not_found() {
    let (_, store) = memory_store();
    let stored = store
        .put(vec![1, 2, 3], NewAsset::new("theme", "audio/mpeg"))
        .await
        .unwrap();
    let id = stored.metadata.id.clone();

    store.get(&id).await.unwrap();
    store.delete(&id).await.unwrap();

    assert_matches!(store.get(&id).await, Err(AssetError::NotFound(missing)) if missing == id);
    assert!(!stored.handle.is_valid());
    assert!(!store.exists(&id).await.unwrap());
}

#[tokio::test]
async fn deleting_unknown_asset_is_not_found() {
    let (_, store) = memory_store();
    assert_matches!(store.delete("missing").await, Err(AssetError::NotFound(_)));
}

#[tokio::test]
async fn replace_revokes_previous_handle() {
    let (_, store) = memory_store();
    let stored = store
        .put(vec![1, 2, 3], NewAsset::new("clip", "video/mp4"))
        .await
        .unwrap();
    let id = stored.metadata.id.clone();

    let replaced = store.replace(&id, vec![9; 5], "video/webm").await.unwrap();

    assert!(!stored.handle.is_valid());
    assert_eq!(replaced.metadata.id, id);
    assert_eq!(replaced.metadata.size, 5);
    assert_eq!(replaced.metadata.mime_type, "video/webm");

    let fetched = store.get(&id).await.unwrap();
    assert_eq!(fetched.handle.url(), replaced.handle.url());
    assert_eq!(fetched.handle.bytes().unwrap(), &[9; 5]);
}

#[tokio::test]
async fn external_removal_evicts_cached_handle() {
    use pov_assets::BlobStore;

    let (blob, store) = memory_store();
    let stored = store
        .put(vec![4], NewAsset::new("sfx", "audio/wav"))
        .await
        .unwrap();
    let id = stored.metadata.id.clone();

    // Another writer removes the record behind the store's back.
    blob.delete(&format!("meta/{id}")).await.unwrap();

    assert_matches!(store.get(&id).await, Err(AssetError::NotFound(_)));
    assert!(!stored.handle.is_valid());
}

// ---------------------------------------------------------------------------
// Upload processing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_image_is_downsampled_before_persisting() {
    let blob = Arc::new(MemoryBlobStore::new());
    let config = AssetStoreConfig {
        max_image_width: 64,
        max_image_height: 36,
        ..Default::default()
    };
    let store = AssetStore::new(blob, Arc::new(NoopProbe), config);

    let stored = store
        .put(png(256, 144), NewAsset::new("backdrop", "image/png"))
        .await
        .unwrap();

    let dims = stored.metadata.dimensions.unwrap();
    assert_eq!((dims.width, dims.height), (64, 36));
    assert_eq!(stored.metadata.kind, AssetKind::Image);
    assert_eq!(stored.metadata.size, stored.handle.len() as u64);
}

#[tokio::test]
async fn corrupt_image_is_rejected_without_persisting() {
    let (blob, store) = memory_store();
    assert_matches!(
        store.put(vec![0, 1, 2], NewAsset::new("broken", "image/png")).await,
        Err(AssetError::Decode(_))
    );
    assert_eq!(blob.used_bytes().await, 0);
}

// ---------------------------------------------------------------------------
// Failed metadata commits
// ---------------------------------------------------------------------------

/// Memory store whose `meta/` writes can be switched to fail with a full
/// quota.
struct FullMetadata {
    inner: MemoryBlobStore,
    full: AtomicBool,
}

#[async_trait]
impl BlobStore for FullMetadata {
    async fn init(&self) -> Result<(), StorageError> {
        self.inner.init().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        if key.starts_with("meta/") && self.full.load(Ordering::SeqCst) {
            return Err(StorageError::QuotaExceeded {
                requested: value.len() as u64,
                available: 0,
            });
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }
}

fn failing_store() -> (Arc<FullMetadata>, AssetStore) {
    let blob = Arc::new(FullMetadata {
        inner: MemoryBlobStore::new(),
        full: AtomicBool::new(false),
    });
    let store = AssetStore::new(blob.clone(), Arc::new(NoopProbe), AssetStoreConfig::default());
    (blob, store)
}

#[tokio::test]
async fn failed_replace_keeps_previous_payload() {
    let (blob, store) = failing_store();
    let stored = store
        .put(vec![1, 2, 3, 4], NewAsset::new("theme", "audio/mp3"))
        .await
        .unwrap();
    let id = stored.metadata.id.clone();

    blob.full.store(true, Ordering::SeqCst);
    assert_matches!(
        store.replace(&id, vec![9; 100], "audio/mpeg").await,
        Err(AssetError::Storage(StorageError::QuotaExceeded { .. }))
    );
    blob.full.store(false, Ordering::SeqCst);

    let current = store.get(&id).await.unwrap();
    assert_eq!(current.metadata.size, 4);
    assert_eq!(current.metadata.mime_type, "audio/mp3");
    assert_eq!(current.handle.bytes().unwrap(), &[1, 2, 3, 4]);
}

#[tokio::test]
async fn failed_put_leaves_no_payload_behind() {
    let (blob, store) = failing_store();
    blob.full.store(true, Ordering::SeqCst);

    assert_matches!(
        store.put(vec![1, 2, 3], NewAsset::new("theme", "audio/mpeg")).await,
        Err(AssetError::Storage(StorageError::QuotaExceeded { .. }))
    );
    assert!(blob.list("blob/").await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_filters_and_orders_by_creation() {
    let (_, store) = memory_store();
    let first = store
        .put(vec![1], NewAsset::new("Forest walk", "audio/ogg").with_tags(["nature"]))
        .await
        .unwrap();
    let second = store
        .put(vec![2], NewAsset::new("City walk", "audio/ogg").with_tags(["urban"]))
        .await
        .unwrap();
    store
        .put(vec![3], NewAsset::new("Forest clip", "video/mp4").with_tags(["nature"]))
        .await
        .unwrap();

    let all = store.list(&AssetFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, first.metadata.id);
    assert_eq!(all[1].id, second.metadata.id);

    let nature_audio = store
        .list(&AssetFilter {
            kind: Some(AssetKind::Audio),
            tags: vec!["nature".into()],
            search: None,
        })
        .await
        .unwrap();
    assert_eq!(nature_audio.len(), 1);
    assert_eq!(nature_audio[0].name, "Forest walk");

    let walks = store
        .list(&AssetFilter {
            search: Some("WALK".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(walks.len(), 2);
}

// ---------------------------------------------------------------------------
// Filesystem backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filesystem_store_creates_root_lazily_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("assets");

    let id = {
        let store = AssetStore::new(
            Arc::new(FsBlobStore::new(&root)),
            Arc::new(NoopProbe),
            AssetStoreConfig::default(),
        );
        store
            .put(vec![7, 7, 7], NewAsset::new("loop", "audio/mpeg"))
            .await
            .unwrap()
            .metadata
            .id
    };
    assert!(root.exists());

    // A fresh store over the same directory sees the asset.
    let reopened = AssetStore::new(
        Arc::new(FsBlobStore::new(&root)),
        Arc::new(NoopProbe),
        AssetStoreConfig::default(),
    );
    let fetched = reopened.get(&id).await.unwrap();
    assert_eq!(fetched.handle.bytes().unwrap(), &[7, 7, 7]);
    assert_eq!(fetched.metadata.name, "loop");
}

#[tokio::test]
async fn filesystem_quota_is_distinguishable() {
    let dir = tempfile::tempdir().unwrap();
    let store = AssetStore::new(
        Arc::new(FsBlobStore::new(dir.path()).with_quota(Some(8))),
        Arc::new(NoopProbe),
        AssetStoreConfig::default(),
    );

    assert_matches!(
        store.put(vec![0; 32], NewAsset::new("big", "audio/mpeg")).await,
        Err(AssetError::Storage(StorageError::QuotaExceeded { .. }))
    );
}
