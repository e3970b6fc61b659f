use pov_core::types::AssetId;

/// Failures of the underlying blob store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing namespace has never been created. Safe to create lazily.
    #[error("Storage namespace '{0}' has not been created")]
    NotInitialized(String),

    /// The store exists but could not serve the request. Transient.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded: requested {requested} bytes, {available} bytes available")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Asset-domain error type.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    #[error("Unsupported media type: {0}")]
    UnsupportedType(String),

    #[error("Asset {id} is a {expected} and cannot be replaced with {actual}")]
    KindMismatch {
        id: AssetId,
        expected: &'static str,
        actual: String,
    },

    #[error("Failed to decode media: {0}")]
    Decode(String),

    #[error("Access handle for asset {0} has been revoked")]
    Revoked(AssetId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
