//! Scenario node/edge data model.
//!
//! The serde representation is the one used inside `.pov` documents
//! (camelCase keys). Sub-objects that are present but incomplete are filled
//! with the documented defaults on deserialization.

use serde::{Deserialize, Serialize};

use crate::handle::SourceHandle;
use crate::types::{AssetId, ChoiceId, EdgeId, NodeId};

// ---------------------------------------------------------------------------
// Node type constants
// ---------------------------------------------------------------------------

/// Node type tags understood by the player.
pub mod node_types {
    pub const IMAGE: &str = "image";
    pub const VIDEO: &str = "video";
    pub const TEXT: &str = "text";

    /// All recognised node types.
    pub const ALL: &[&str] = &[IMAGE, VIDEO, TEXT];
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Timer duration used when a timer object omits `duration`.
pub const DEFAULT_TIMER_DURATION_SECS: f64 = 5.0;

/// Audio volume used when an audio object omits `volume`.
pub const DEFAULT_AUDIO_VOLUME: f64 = 1.0;

fn default_timer_duration() -> f64 {
    DEFAULT_TIMER_DURATION_SECS
}

fn default_audio_volume() -> f64 {
    DEFAULT_AUDIO_VOLUME
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Canvas position of a node. Layout only; never read by playback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A narrative step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    pub data: NodeData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    /// Primary media (image or video).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<AssetId>,
    /// Background audio track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_id: Option<AssetId>,
    #[serde(default)]
    pub content: NodeContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeContent {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSettings>,
}

/// A selectable option. Its target is derived from the edge bound to
/// `button-handle-<id>`; see [`crate::GraphStore::choice_target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    /// Seconds before the timer fires.
    #[serde(default = "default_timer_duration")]
    pub duration: f64,
    #[serde(default = "default_true")]
    pub auto_transition: bool,
    #[serde(rename = "loop", default)]
    pub looping: bool,
    #[serde(default)]
    pub pause_on_interaction: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            duration: DEFAULT_TIMER_DURATION_SECS,
            auto_transition: true,
            looping: false,
            pause_on_interaction: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    /// Target volume in `0.0..=1.0`.
    #[serde(default = "default_audio_volume")]
    pub volume: f64,
    #[serde(rename = "loop", default)]
    pub looping: bool,
    /// Fade-in length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<f64>,
    /// Fade-out length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<f64>,
}

impl AudioSettings {
    /// Volume clamped to `0.0..=1.0`; NaN counts as silent.
    pub fn effective_volume(&self) -> f64 {
        if self.volume.is_nan() {
            0.0
        } else {
            self.volume.clamp(0.0, 1.0)
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: DEFAULT_AUDIO_VOLUME,
            looping: false,
            fade_in: None,
            fade_out: None,
        }
    }
}

impl Node {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            position,
            data: NodeData::default(),
        }
    }

    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.data.content.choices.iter().find(|c| c.id == choice_id)
    }

    pub fn timer(&self) -> Option<&TimerSettings> {
        self.data.content.timer.as_ref()
    }

    /// Iterate the asset ids this node references (media first, then audio).
    pub fn asset_ids(&self) -> impl Iterator<Item = &AssetId> {
        self.data.media_id.iter().chain(self.data.audio_id.iter())
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A directed link between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Raw handle string, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EdgeData>,
}

impl Edge {
    /// Parsed slot of this edge's source handle.
    pub fn handle(&self) -> SourceHandle {
        SourceHandle::parse(self.source_handle.as_deref())
    }

    pub fn label(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.label.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
