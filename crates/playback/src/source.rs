use async_trait::async_trait;
use pov_assets::{AssetError, AssetStore, StoredAsset};

/// Where the player resolves asset ids to playable media.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn load(&self, asset_id: &str) -> Result<StoredAsset, AssetError>;
}

#[async_trait]
impl MediaSource for AssetStore {
    async fn load(&self, asset_id: &str) -> Result<StoredAsset, AssetError> {
        self.get(asset_id).await
    }
}
