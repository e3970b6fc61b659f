//! Player states and the events published while playing.

use pov_assets::AssetKind;
use pov_core::types::{AssetId, ChoiceId, NodeId};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PlaybackState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackState {
    /// Loading the node's media.
    Entering { node_id: NodeId },
    Playing { node_id: NodeId },
    /// Media finished; only a choice can move the player on.
    AwaitingChoice { node_id: NodeId },
    /// Nothing follows this node. The caller should close the player.
    Terminal { node_id: NodeId },
    Stopped,
}

impl PlaybackState {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Entering { node_id }
            | Self::Playing { node_id }
            | Self::AwaitingChoice { node_id }
            | Self::Terminal { node_id } => Some(node_id),
            Self::Stopped => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Entering { .. } => "entering",
            Self::Playing { .. } => "playing",
            Self::AwaitingChoice { .. } => "awaiting_choice",
            Self::Terminal { .. } => "terminal",
            Self::Stopped => "stopped",
        }
    }

    pub fn accepts_choices(&self) -> bool {
        matches!(self, Self::Playing { .. } | Self::AwaitingChoice { .. })
    }
}

// ---------------------------------------------------------------------------
// PlaybackEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    NodeEntered {
        node_id: NodeId,
    },
    MediaReady {
        node_id: NodeId,
        asset_id: AssetId,
        kind: AssetKind,
        url: String,
    },
    /// The asset could not be loaded; render a placeholder.
    MediaUnavailable {
        node_id: NodeId,
        asset_id: AssetId,
        reason: String,
    },
    TimerArmed {
        node_id: NodeId,
        duration_secs: f64,
    },
    TimerCancelled {
        node_id: NodeId,
    },
    /// The timer or video finished and restarts instead of completing.
    Looped {
        node_id: NodeId,
    },
    AwaitingChoice {
        node_id: NodeId,
        choices: Vec<ChoiceId>,
    },
    Advanced {
        from: NodeId,
        to: NodeId,
        /// `None` for an automatic transition.
        choice_id: Option<ChoiceId>,
    },
    Terminal {
        node_id: NodeId,
    },
    AudioStarted {
        node_id: NodeId,
        asset_id: AssetId,
        url: String,
        volume: f64,
        looping: bool,
    },
    AudioVolume {
        node_id: NodeId,
        volume: f64,
    },
    AudioStopped {
        node_id: NodeId,
    },
    Stopped,
}

/// Default buffer capacity for the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out of [`PlaybackEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    sender: broadcast::Sender<PlaybackEvent>,
}

impl EventSender {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Events published with no subscriber are dropped.
    pub(crate) fn publish(&self, event: PlaybackEvent) {
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.sender.subscribe()
    }
}
