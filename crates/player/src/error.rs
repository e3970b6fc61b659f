use pov_assets::AssetError;
use pov_codec::CodecError;
use pov_core::CoreError;
use pov_playback::PlaybackError;

/// Failure of a player command, reported to the user before exiting.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Graph(#[from] CoreError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}
