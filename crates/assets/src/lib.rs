//! Durable media asset storage with an ephemeral access-handle cache.
//!
//! - [`BlobStore`] -- the host-supplied key/value seam, with
//!   [`MemoryBlobStore`] and [`FsBlobStore`] implementations.
//! - [`AssetStore`] -- typed asset records on top of a blob store: MIME
//!   gating, image downsampling, media probing and revocable
//!   [`AccessHandle`]s.
//! - [`MediaProbe`] -- duration/dimension extraction for audio and video.

pub mod blob;
pub mod error;
pub mod fs;
pub mod handle;
pub mod imaging;
pub mod metadata;
pub mod probe;
pub mod retry;
pub mod store;

pub use blob::{BlobStore, MemoryBlobStore};
pub use error::{AssetError, StorageError};
pub use fs::FsBlobStore;
pub use handle::AccessHandle;
pub use metadata::{AssetFilter, AssetKind, AssetRecord, AssetUpdate, Dimensions, NewAsset};
pub use probe::{FfprobeProbe, MediaProbe, NoopProbe, ProbeResult};
pub use retry::RetryConfig;
pub use store::{AssetStore, AssetStoreConfig, StorageUsage, StoredAsset};
