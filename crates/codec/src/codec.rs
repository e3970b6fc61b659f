//! Export a live graph to a portable document and import it back.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use pov_assets::{AssetError, AssetKind, AssetStore, NewAsset};
use pov_core::types::{AssetId, NodeId};
use pov_core::GraphStore;

use crate::dataurl;
use crate::document::{MediaEntry, MediaMetadata, ScenarioDocument, FILE_EXTENSION};
use crate::error::CodecError;

/// Fallback file stem for titles without any usable characters.
const DEFAULT_FILE_STEM: &str = "scenario";

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Fail instead of warning when the graph does not have exactly one
    /// entry node.
    pub require_single_entry: bool,
}

#[derive(Debug, Clone)]
pub struct ExportedScenario {
    /// `<slug>.pov`.
    pub file_name: String,
    pub document: ScenarioDocument,
}

#[derive(Debug, Clone)]
pub struct ImportedScenario {
    pub graph: GraphStore,
    /// Bundled asset id to freshly ingested asset id.
    pub asset_ids: HashMap<AssetId, AssetId>,
    /// Non-fatal problems, such as nodes referencing media absent from the
    /// bundle.
    pub warnings: Vec<String>,
}

/// A bundled payload decoded and checked before anything is ingested.
struct PendingAsset {
    bundled_id: AssetId,
    bytes: Vec<u8>,
    new: NewAsset,
}

/// Converts between a [`GraphStore`] and a [`ScenarioDocument`].
pub struct ScenarioCodec {
    assets: Arc<AssetStore>,
}

impl ScenarioCodec {
    pub fn new(assets: Arc<AssetStore>) -> Self {
        Self { assets }
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    /// Bundle `graph` and every asset it references.
    ///
    /// Payloads are copied out of the asset store into standalone data URLs,
    /// so the document is unaffected by later local edits. Assets that no
    /// longer exist are skipped with a warning.
    pub async fn export(
        &self,
        title: &str,
        graph: &GraphStore,
        options: &ExportOptions,
    ) -> Result<ExportedScenario, CodecError> {
        if options.require_single_entry {
            graph.validate_entry_point()?;
        } else if let Err(e) = graph.validate_entry_point() {
            tracing::warn!(title, error = %e, "Exporting scenario with ambiguous entry point");
        }

        let mut media = BTreeMap::new();
        for asset_id in graph.referenced_asset_ids() {
            let stored = match self.assets.get(&asset_id).await {
                Ok(stored) => stored,
                Err(AssetError::NotFound(_)) => {
                    tracing::warn!(%asset_id, "Referenced asset missing, not bundled");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let bytes = stored.handle.detach()?;
            let url = dataurl::encode(&stored.metadata.mime_type, &bytes);
            media.insert(
                asset_id,
                MediaEntry {
                    metadata: MediaMetadata::from(stored.metadata),
                    url,
                },
            );
        }

        let document = ScenarioDocument {
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().cloned().collect(),
            media,
        };

        tracing::info!(
            title,
            nodes = document.nodes.len(),
            edges = document.edges.len(),
            media = document.media.len(),
            "Scenario exported",
        );
        Ok(ExportedScenario {
            file_name: file_name_for(title),
            document,
        })
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Parse, validate and import a serialized document.
    pub async fn import_str(&self, text: &str) -> Result<ImportedScenario, CodecError> {
        let document = ScenarioDocument::from_json(text)?;
        self.import(document).await
    }

    /// Rebuild a graph from `document`, ingesting every bundled asset as a
    /// new record.
    ///
    /// All validation happens before the first asset is written. If an
    /// ingest fails part-way, the assets already ingested are deleted again.
    pub async fn import(&self, document: ScenarioDocument) -> Result<ImportedScenario, CodecError> {
        let ScenarioDocument {
            nodes,
            edges,
            media,
        } = document;

        let mut graph = GraphStore::from_parts(nodes, edges)?;
        let pending = decode_media(media)?;
        let asset_ids = self.ingest(pending).await?;

        let mut warnings = Vec::new();
        let node_ids: Vec<NodeId> = graph.nodes().map(|n| n.id.clone()).collect();
        for node_id in &node_ids {
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            let media_id = rewire(
                node_id,
                "media",
                node.data.media_id.as_ref(),
                &asset_ids,
                &mut warnings,
            );
            let audio_id = rewire(
                node_id,
                "audio",
                node.data.audio_id.as_ref(),
                &asset_ids,
                &mut warnings,
            );
            graph.set_media(node_id, media_id)?;
            graph.set_audio(node_id, audio_id)?;
        }

        for warning in &warnings {
            tracing::warn!(warning = %warning, "Import warning");
        }
        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            assets = asset_ids.len(),
            warnings = warnings.len(),
            "Scenario imported",
        );
        Ok(ImportedScenario {
            graph,
            asset_ids,
            warnings,
        })
    }

    async fn ingest(
        &self,
        pending: Vec<PendingAsset>,
    ) -> Result<HashMap<AssetId, AssetId>, CodecError> {
        let mut ingested: HashMap<AssetId, AssetId> = HashMap::with_capacity(pending.len());

        for asset in pending {
            match self.assets.put(asset.bytes, asset.new).await {
                Ok(stored) => {
                    ingested.insert(asset.bundled_id, stored.metadata.id);
                }
                Err(e) => {
                    tracing::error!(
                        bundled_id = %asset.bundled_id,
                        error = %e,
                        rolled_back = ingested.len(),
                        "Asset ingest failed, rolling back import",
                    );
                    for new_id in ingested.values() {
                        if let Err(cleanup) = self.assets.delete(new_id).await {
                            tracing::warn!(
                                asset_id = %new_id,
                                error = %cleanup,
                                "Rollback delete failed",
                            );
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(ingested)
    }
}

/// Decode every payload and resolve its kind up front.
fn decode_media(media: BTreeMap<AssetId, MediaEntry>) -> Result<Vec<PendingAsset>, CodecError> {
    media
        .into_iter()
        .map(|(bundled_id, entry)| -> Result<PendingAsset, CodecError> {
            let (url_mime, bytes) = dataurl::decode(&entry.url).map_err(|e| match e {
                CodecError::Validation(msg) => {
                    CodecError::Validation(format!("media entry '{bundled_id}': {msg}"))
                }
                other => other,
            })?;

            let meta = entry.metadata;
            let mime_type = meta
                .mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(url_mime);
            AssetKind::from_mime(&mime_type).map_err(|_| {
                CodecError::Validation(format!(
                    "media entry '{bundled_id}' has unsupported type '{mime_type}'"
                ))
            })?;

            let name = if meta.name.is_empty() {
                bundled_id.clone()
            } else {
                meta.name
            };
            let new = NewAsset {
                name,
                mime_type,
                tags: meta.tags,
                duration: meta.duration,
                dimensions: meta.dimensions,
            };
            Ok(PendingAsset {
                bundled_id,
                bytes,
                new,
            })
        })
        .collect()
}

/// Map a bundled asset reference to its new id, warning when it is absent.
fn rewire(
    node_id: &str,
    slot: &str,
    bundled: Option<&AssetId>,
    asset_ids: &HashMap<AssetId, AssetId>,
    warnings: &mut Vec<String>,
) -> Option<AssetId> {
    let bundled = bundled?;
    match asset_ids.get(bundled) {
        Some(new_id) => Some(new_id.clone()),
        None => {
            warnings.push(format!(
                "node '{node_id}' references {slot} '{bundled}' which is not in the bundle"
            ));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// URL-safe file stem: lowercase ASCII alphanumerics joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut prev_hyphen = true;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen {
            slug.push('-');
            prev_hyphen = true;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        slug.to_string()
    }
}

pub fn file_name_for(title: &str) -> String {
    format!("{}.{FILE_EXTENSION}", slugify(title))
}

pub async fn write_file(path: &Path, document: &ScenarioDocument) -> Result<(), CodecError> {
    let json = document.to_json()?;
    tokio::fs::write(path, json).await?;
    tracing::debug!(path = %path.display(), "Scenario document written");
    Ok(())
}

pub async fn read_file(path: &Path) -> Result<ScenarioDocument, CodecError> {
    let text = tokio::fs::read_to_string(path).await?;
    ScenarioDocument::from_json(&text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
