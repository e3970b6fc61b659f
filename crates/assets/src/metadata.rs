//! Asset metadata records, accepted media types and list filters.

use pov_core::types::{AssetId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::AssetError;

// ---------------------------------------------------------------------------
// Accepted media types
// ---------------------------------------------------------------------------

pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

pub const ACCEPTED_VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm", "video/ogg", "video/quicktime"];

pub const ACCEPTED_AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/ogg",
    "audio/webm",
    "audio/aac",
    "audio/mp4",
];

/// Lowercase a MIME type and drop any parameters (`; codecs=...`).
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// AssetKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Audio,
}

impl AssetKind {
    /// Infer the kind from a MIME type, rejecting anything outside the
    /// accepted set.
    pub fn from_mime(mime_type: &str) -> Result<Self, AssetError> {
        let mime = normalize_mime(mime_type);
        let mime = mime.as_str();
        if ACCEPTED_IMAGE_TYPES.contains(&mime) {
            Ok(Self::Image)
        } else if ACCEPTED_VIDEO_TYPES.contains(&mime) {
            Ok(Self::Video)
        } else if ACCEPTED_AUDIO_TYPES.contains(&mime) {
            Ok(Self::Audio)
        } else {
            Err(AssetError::UnsupportedType(mime_type.to_string()))
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Whether the kind has a playback duration.
    pub fn is_timed(self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Persisted metadata of one asset. The payload is stored separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: AssetId,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub mime_type: String,
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Seconds, for audio and video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

/// Caller-supplied metadata for a new upload.
///
/// `duration` and `dimensions` win over probed values when set.
#[derive(Debug, Clone, Default)]
pub struct NewAsset {
    pub name: String,
    pub mime_type: String,
    pub tags: Vec<String>,
    pub duration: Option<f64>,
    pub dimensions: Option<Dimensions>,
}

impl NewAsset {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Metadata-only edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct AssetUpdate {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub kind: Option<AssetKind>,
    /// Every listed tag must be present on the asset.
    pub tags: Vec<String>,
    /// Case-insensitive substring of the asset name.
    pub search: Option<String>,
}

impl AssetFilter {
    pub fn matches(&self, record: &AssetRecord) -> bool {
        if self.kind.is_some_and(|k| k != record.kind) {
            return false;
        }
        if !self.tags.iter().all(|t| record.tags.contains(t)) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => record
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
