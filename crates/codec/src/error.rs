use pov_assets::AssetError;
use pov_core::CoreError;

/// Codec error type.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The document is malformed. Import aborts with no partial state.
    #[error("Invalid scenario document: {0}")]
    Validation(String),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CoreError> for CodecError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) | CoreError::Conflict(msg) => Self::Validation(msg),
            CoreError::NotFound { entity, id } => {
                Self::Validation(format!("{entity} '{id}' not found"))
            }
        }
    }
}
