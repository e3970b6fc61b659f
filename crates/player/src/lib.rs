//! `pov-player` -- command-line host for scenario documents.
//!
//! Wires the asset library, the codec and the playback engine together
//! and exposes them as `inspect`, `play`, `import`, `repack` and `assets`
//! commands.

pub mod commands;
pub mod config;
pub mod error;
pub mod session;

pub use config::{LogFormat, PlayerConfig};
pub use error::PlayerError;
