//! The portable `.pov` scenario document and its structural validation.
//!
//! ```text
//! { "nodes": [ {id, type, data} ],
//!   "edges": [ {id, source, target, sourceHandle?, data?} ],
//!   "media": { "<assetId>": { metadata, url } } }
//! ```

use std::collections::BTreeMap;

use pov_assets::{AssetKind, AssetRecord, Dimensions};
use pov_core::types::{AssetId, Timestamp};
use pov_core::{Edge, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// File extension of exported scenarios.
pub const FILE_EXTENSION: &str = "pov";

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDocument {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub media: BTreeMap<AssetId, MediaEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub metadata: MediaMetadata,
    /// Standalone `data:` URL with the payload.
    pub url: String,
}

/// Asset metadata as bundled in a document.
///
/// Export always writes every field; import tolerates missing ones since the
/// asset is re-ingested and its record rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(default)]
    pub id: AssetId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssetKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

impl From<AssetRecord> for MediaMetadata {
    fn from(record: AssetRecord) -> Self {
        Self {
            id: record.id,
            kind: Some(record.kind),
            mime_type: Some(record.mime_type),
            name: record.name,
            size: Some(record.size),
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            tags: record.tags,
            duration: record.duration,
            dimensions: record.dimensions,
        }
    }
}

impl ScenarioDocument {
    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and structurally validate a document.
    ///
    /// Malformed JSON and schema violations both fail with
    /// [`CodecError::Validation`].
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CodecError::Validation(format!("document is not valid JSON: {e}")))?;
        validate_structure(&value)?;
        serde_json::from_value(value).map_err(|e| CodecError::Validation(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// Check required fields in order: nodes, then edges, then media.
///
/// Returns the first violation found.
pub fn validate_structure(value: &Value) -> Result<(), CodecError> {
    let root = value
        .as_object()
        .ok_or_else(|| invalid("document root must be an object"))?;

    let nodes = root
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing 'nodes' array"))?;
    for (idx, node) in nodes.iter().enumerate() {
        require_string(node, "id", "node", idx)?;
        require_string(node, "type", "node", idx)?;
        if !node.get("data").is_some_and(Value::is_object) {
            return Err(invalid(format!("node {idx} is missing 'data'")));
        }
    }

    let edges = root
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing 'edges' array"))?;
    for (idx, edge) in edges.iter().enumerate() {
        for field in ["id", "source", "target"] {
            require_string(edge, field, "edge", idx)?;
        }
    }

    match root.get("media") {
        None | Some(Value::Null) => {}
        Some(Value::Object(media)) => {
            for (asset_id, entry) in media {
                if !entry.get("metadata").is_some_and(Value::is_object) {
                    return Err(invalid(format!(
                        "media entry '{asset_id}' is missing 'metadata'"
                    )));
                }
                if !entry.get("url").is_some_and(Value::is_string) {
                    return Err(invalid(format!(
                        "media entry '{asset_id}' is missing its payload 'url'"
                    )));
                }
            }
        }
        Some(_) => return Err(invalid("'media' must be an object")),
    }

    Ok(())
}

fn require_string(item: &Value, field: &str, what: &str, idx: usize) -> Result<(), CodecError> {
    match item.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(invalid(format!("{what} {idx} is missing '{field}'"))),
    }
}

fn invalid(msg: impl Into<String>) -> CodecError {
    CodecError::Validation(msg.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
