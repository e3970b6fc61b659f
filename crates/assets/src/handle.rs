//! Revocable access handles.
//!
//! An [`AccessHandle`] exposes a stored asset's bytes through a shared
//! buffer and a `blob:` style URL. The asset store revokes a handle when the
//! asset is deleted or its payload is overwritten; reading a revoked handle
//! fails with [`AssetError::Revoked`].

use std::sync::Arc;

use pov_core::types::AssetId;
use tokio_util::sync::CancellationToken;

use crate::error::AssetError;

/// URL scheme prefix of minted handles.
pub const HANDLE_URL_PREFIX: &str = "blob:pov/";

#[derive(Debug, Clone)]
pub struct AccessHandle {
    asset_id: AssetId,
    url: String,
    mime_type: String,
    data: Arc<[u8]>,
    revoked: CancellationToken,
}

impl AccessHandle {
    pub(crate) fn mint(asset_id: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            url: format!("{HANDLE_URL_PREFIX}{}", uuid::Uuid::new_v4()),
            mime_type: mime_type.to_string(),
            data: Arc::from(data),
            revoked: CancellationToken::new(),
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.revoked.is_cancelled()
    }

    /// Borrow the payload without copying.
    pub fn bytes(&self) -> Result<&[u8], AssetError> {
        if self.is_valid() {
            Ok(&self.data)
        } else {
            Err(AssetError::Revoked(self.asset_id.clone()))
        }
    }

    /// Copy the payload into an owned buffer that outlives revocation.
    pub fn detach(&self) -> Result<Vec<u8>, AssetError> {
        self.bytes().map(<[u8]>::to_vec)
    }

    pub(crate) fn revoke(&self) {
        if self.is_valid() {
            tracing::debug!(asset_id = %self.asset_id, url = %self.url, "Access handle revoked");
        }
        self.revoked.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn minted_handles_get_unique_urls() {
        let a = AccessHandle::mint("x", "image/png", vec![1]);
        let b = AccessHandle::mint("x", "image/png", vec![1]);
        assert!(a.url().starts_with(HANDLE_URL_PREFIX));
        assert_ne!(a.url(), b.url());
    }

    #[test]
    fn revocation_is_shared_by_clones() {
        let handle = AccessHandle::mint("x", "audio/mpeg", vec![1, 2, 3]);
        let clone = handle.clone();
        assert_eq!(clone.bytes().unwrap(), &[1, 2, 3]);

        handle.revoke();
        assert!(!clone.is_valid());
        assert_matches!(clone.bytes(), Err(AssetError::Revoked(id)) if id == "x");
        assert_matches!(clone.detach(), Err(AssetError::Revoked(_)));
    }

    #[test]
    fn detached_copy_survives_revocation() {
        let handle = AccessHandle::mint("x", "image/png", vec![7, 8]);
        let copy = handle.detach().unwrap();
        handle.revoke();
        assert_eq!(copy, vec![7, 8]);
    }
}
