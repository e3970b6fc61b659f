//! Scenario graph domain model and invariant-preserving graph store.
//!
//! This crate has zero internal dependencies and no async runtime so it can
//! be shared by the codec, the playback engine and any editor tooling.

pub mod error;
pub mod graph;
pub mod handle;
pub mod scenario;
pub mod types;

pub use error::CoreError;
pub use graph::{ConnectOutcome, GraphStore};
pub use handle::SourceHandle;
pub use scenario::{
    AudioSettings, Choice, Edge, EdgeData, Node, NodeContent, NodeData, Position, TimerSettings,
};
