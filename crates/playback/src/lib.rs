//! Runtime traversal of a scenario graph.
//!
//! [`PlaybackEngine`] executes a [`pov_core::GraphStore`]: it loads each
//! node's media through a [`MediaSource`], runs auto-transition timers and
//! audio fades, and resolves choices into transitions. The UI drives the
//! player through a [`PlayerHandle`] and renders the published
//! [`PlaybackState`] and [`PlaybackEvent`]s.

mod audio;
pub mod engine;
pub mod error;
pub mod source;
pub mod state;

pub use engine::{PlaybackConfig, PlaybackEngine, PlayerHandle, DEFAULT_FADE_STEPS};
pub use error::{PlaybackError, TransitionError};
pub use source::MediaSource;
pub use state::{PlaybackEvent, PlaybackState};
