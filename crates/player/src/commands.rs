//! One-shot commands. Each returns a serializable report that the binary
//! prints as JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pov_assets::{
    AssetFilter, AssetKind, AssetRecord, AssetStore, BlobStore, FfprobeProbe, FsBlobStore,
    MediaProbe, MemoryBlobStore, NewAsset, NoopProbe, StorageUsage,
};
use pov_codec::{dataurl, ExportOptions, ScenarioCodec, ScenarioDocument};
use pov_core::types::{AssetId, ChoiceId, NodeId};
use pov_core::GraphStore;
use serde::Serialize;

use crate::config::PlayerConfig;
use crate::error::PlayerError;

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

fn probe(config: &PlayerConfig) -> Arc<dyn MediaProbe> {
    if config.probe_media {
        Arc::new(FfprobeProbe::default())
    } else {
        Arc::new(NoopProbe)
    }
}

/// The persistent asset library under `POV_STORAGE_DIR`.
pub fn open_library(config: &PlayerConfig) -> Arc<AssetStore> {
    let blobs: Arc<dyn BlobStore> = Arc::new(
        FsBlobStore::new(&config.storage_dir).with_quota(config.storage_quota_bytes),
    );
    Arc::new(AssetStore::new(blobs, probe(config), config.asset_store()))
}

/// An in-memory store for commands that must not touch the library.
pub fn scratch_library(config: &PlayerConfig) -> Arc<AssetStore> {
    Arc::new(AssetStore::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(NoopProbe),
        config.asset_store(),
    ))
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ScenarioSummary {
    pub nodes: usize,
    pub edges: usize,
    pub entry_points: Vec<NodeId>,
    /// Where playback would begin.
    pub start_node: Option<NodeId>,
    pub media: Vec<MediaSummary>,
    /// Referenced by a node but not bundled.
    pub missing_media: Vec<AssetId>,
    /// Bundled but referenced by no node.
    pub unused_media: Vec<AssetId>,
    pub unconnected_choices: Vec<UnconnectedChoice>,
}

#[derive(Debug, Serialize)]
pub struct MediaSummary {
    pub id: AssetId,
    pub kind: Option<AssetKind>,
    pub name: String,
    /// Decoded payload size; `None` when the data URL is malformed.
    pub bytes: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct UnconnectedChoice {
    pub node_id: NodeId,
    pub choice_id: ChoiceId,
    pub text: String,
}

/// Describe a document without ingesting anything.
pub fn inspect(document: &ScenarioDocument) -> Result<ScenarioSummary, PlayerError> {
    let graph = GraphStore::from_parts(document.nodes.clone(), document.edges.clone())?;

    let referenced = graph.referenced_asset_ids();
    let missing_media = referenced
        .iter()
        .filter(|id| !document.media.contains_key(*id))
        .cloned()
        .collect();
    let unused_media = document
        .media
        .keys()
        .filter(|id| !referenced.contains(*id))
        .cloned()
        .collect();

    let media = document
        .media
        .iter()
        .map(|(id, entry)| MediaSummary {
            id: id.clone(),
            kind: entry.metadata.kind,
            name: entry.metadata.name.clone(),
            bytes: dataurl::decode(&entry.url).ok().map(|(_, b)| b.len()),
        })
        .collect();

    let mut unconnected_choices = Vec::new();
    for node in graph.nodes() {
        for choice in &node.data.content.choices {
            if graph.choice_target(&node.id, &choice.id).is_none() {
                unconnected_choices.push(UnconnectedChoice {
                    node_id: node.id.clone(),
                    choice_id: choice.id.clone(),
                    text: choice.text.clone(),
                });
            }
        }
    }

    Ok(ScenarioSummary {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        entry_points: graph.entry_points().iter().map(|n| n.id.clone()).collect(),
        start_node: graph.find_start_node().map(|n| n.id.clone()),
        media,
        missing_media,
        unused_media,
        unconnected_choices,
    })
}

// ---------------------------------------------------------------------------
// import / repack
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub nodes: usize,
    pub edges: usize,
    /// Bundled id -> id in the library.
    pub asset_ids: BTreeMap<AssetId, AssetId>,
    pub warnings: Vec<String>,
}

/// Ingest a document's bundled media into `assets`.
pub async fn import(assets: Arc<AssetStore>, path: &Path) -> Result<ImportReport, PlayerError> {
    let document = pov_codec::read_file(path).await?;
    let imported = ScenarioCodec::new(assets).import(document).await?;
    tracing::info!(
        path = %path.display(),
        assets = imported.asset_ids.len(),
        "Scenario imported",
    );
    Ok(ImportReport {
        nodes: imported.graph.node_count(),
        edges: imported.graph.edge_count(),
        asset_ids: imported.asset_ids.into_iter().collect(),
        warnings: imported.warnings,
    })
}

#[derive(Debug, Serialize)]
pub struct RepackReport {
    pub path: PathBuf,
    pub nodes: usize,
    pub media: usize,
    pub warnings: Vec<String>,
}

/// Import a document into a scratch store and export it again under a new
/// title. Drops unreferenced media and rewrites every asset id.
pub async fn repack(
    config: &PlayerConfig,
    input: &Path,
    title: &str,
    out_dir: &Path,
    require_single_entry: bool,
) -> Result<RepackReport, PlayerError> {
    let codec = ScenarioCodec::new(scratch_library(config));
    let document = pov_codec::read_file(input).await?;
    let imported = codec.import(document).await?;

    let options = ExportOptions {
        require_single_entry,
    };
    let exported = codec.export(title, &imported.graph, &options).await?;
    let path = out_dir.join(&exported.file_name);
    pov_codec::write_file(&path, &exported.document).await?;

    Ok(RepackReport {
        path,
        nodes: exported.document.nodes.len(),
        media: exported.document.media.len(),
        warnings: imported.warnings,
    })
}

// ---------------------------------------------------------------------------
// assets
// ---------------------------------------------------------------------------

/// MIME type for a media file extension in the accepted set.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "ogv" => "video/ogg",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        _ => return None,
    };
    Some(mime)
}

/// Add a file to the library. The MIME type defaults to one inferred from
/// the extension and the name to the file stem.
pub async fn add_asset(
    assets: &AssetStore,
    path: &Path,
    name: Option<String>,
    mime_type: Option<String>,
    tags: Vec<String>,
) -> Result<AssetRecord, PlayerError> {
    let mime_type = match mime_type {
        Some(mime) => mime,
        None => mime_for_path(path)
            .ok_or_else(|| {
                PlayerError::Usage(format!(
                    "Cannot infer a media type for {}; pass --mime",
                    path.display()
                ))
            })?
            .to_string(),
    };
    let name = name.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let bytes = tokio::fs::read(path).await?;
    let stored = assets
        .put(bytes, NewAsset::new(name, mime_type).with_tags(tags))
        .await?;
    Ok(stored.metadata)
}

pub async fn list_assets(
    assets: &AssetStore,
    filter: &AssetFilter,
) -> Result<Vec<AssetRecord>, PlayerError> {
    Ok(assets.list(filter).await?)
}

pub async fn usage(assets: &AssetStore) -> Result<StorageUsage, PlayerError> {
    Ok(assets.usage().await?)
}

pub async fn delete_assets(
    assets: &AssetStore,
    ids: &[AssetId],
) -> Result<BTreeSet<AssetId>, PlayerError> {
    let mut deleted = BTreeSet::new();
    for id in ids {
        assets.delete(id).await?;
        deleted.insert(id.clone());
    }
    Ok(deleted)
}
