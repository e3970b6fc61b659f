use pov_core::types::{ChoiceId, NodeId};

/// Errors starting a player.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// Empty graph, or every node has an incoming edge.
    #[error("Scenario has no start node")]
    NoStartNode,
}

/// Why a choice selection did not move the player.
///
/// A failed transition leaves the player where it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Player has stopped")]
    Stopped,

    #[error("Choices are not actionable while {state}")]
    NotActionable { state: &'static str },

    #[error("Node {node_id} has no choice {choice_id}")]
    UnknownChoice { node_id: NodeId, choice_id: ChoiceId },

    /// The choice exists but no edge is bound to its handle.
    #[error("Choice {choice_id} on node {node_id} is not connected to any node")]
    Unresolved { node_id: NodeId, choice_id: ChoiceId },
}
