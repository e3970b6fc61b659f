//! Portable `.pov` scenario documents.
//!
//! [`ScenarioCodec`] exports a [`pov_core::GraphStore`] together with every
//! asset it references, embedding payloads as base64 data URLs, and imports
//! such documents back as a new graph with freshly ingested assets.

pub mod codec;
pub mod dataurl;
pub mod document;
pub mod error;

pub use codec::{
    file_name_for, read_file, slugify, write_file, ExportOptions, ExportedScenario,
    ImportedScenario, ScenarioCodec,
};
pub use document::{MediaEntry, MediaMetadata, ScenarioDocument, FILE_EXTENSION};
pub use error::CodecError;
