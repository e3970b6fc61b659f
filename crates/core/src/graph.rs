//! In-memory scenario graph with invariant-preserving mutations.
//!
//! Edges are the single source of truth for transitions. A slot index keyed
//! by `(source, SourceHandle)` enforces "at most one edge per source handle"
//! and answers choice-target queries, so there is no per-choice target field
//! that could drift out of sync.
//!
//! All mutations are synchronous and applied in call order. Persistence is
//! the caller's responsibility.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::error::CoreError;
use crate::handle::SourceHandle;
use crate::scenario::{Choice, Edge, Node, NodeContent, Position};
use crate::types::{new_id, AssetId, ChoiceId, EdgeId, NodeId};

/// Result of a [`GraphStore::connect`] call that found both endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    /// The edge was created. `replaced` holds the edge previously bound to
    /// the same `(source, handle)` slot, if any.
    Connected {
        edge_id: EdgeId,
        replaced: Option<Edge>,
    },
    /// Source and target were the same node; nothing changed.
    SelfLoopIgnored,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
    slots: HashMap<(NodeId, SourceHandle), EdgeId>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load nodes and edges, keeping their ids verbatim.
    ///
    /// Duplicate node or edge ids, dangling endpoints and self-loops are
    /// rejected. Two edges sharing a `(source, handle)` slot resolve
    /// last-wins, the same as repeated [`connect`](Self::connect) calls.
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, CoreError> {
        let mut graph = Self::new();

        for node in nodes {
            if graph.nodes.contains_key(&node.id) {
                return Err(CoreError::Validation(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            graph.nodes.insert(node.id.clone(), node);
        }

        for edge in edges {
            if graph.edges.contains_key(&edge.id) {
                return Err(CoreError::Validation(format!(
                    "duplicate edge id '{}'",
                    edge.id
                )));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !graph.nodes.contains_key(endpoint) {
                    return Err(CoreError::Validation(format!(
                        "edge '{}' references unknown node '{endpoint}'",
                        edge.id
                    )));
                }
            }
            if edge.source == edge.target {
                return Err(CoreError::Validation(format!(
                    "edge '{}' is a self-loop on node '{}'",
                    edge.id, edge.source
                )));
            }

            let slot = (edge.source.clone(), edge.handle());
            if let Some(previous) = graph.slots.get(&slot).cloned() {
                tracing::warn!(
                    edge_id = %previous,
                    replaced_by = %edge.id,
                    source = %edge.source,
                    handle = %slot.1,
                    "Duplicate edge slot, keeping the later edge",
                );
                graph.edges.shift_remove(&previous);
            }
            graph.slots.insert(slot, edge.id.clone());
            graph.edges.insert(edge.id.clone(), edge);
        }

        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Outgoing edges of `node_id` in insertion order.
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| e.source == node_id)
    }

    pub fn incoming_count(&self, node_id: &str) -> usize {
        self.edges.values().filter(|e| e.target == node_id).count()
    }

    /// Whether any outgoing edge of `node_id` is bound to a choice handle.
    pub fn has_choice_edges(&self, node_id: &str) -> bool {
        self.outgoing(node_id)
            .any(|e| matches!(e.handle(), SourceHandle::Choice(_)))
    }

    /// Every asset id referenced by a node's media or audio, in first-seen order.
    pub fn referenced_asset_ids(&self) -> IndexSet<AssetId> {
        self.nodes
            .values()
            .flat_map(|n| n.asset_ids())
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Nodes with no incoming edge, in insertion order.
    pub fn entry_points(&self) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| !self.edges.values().any(|e| e.target == n.id))
            .collect()
    }

    /// The first node (insertion order) with no incoming edge.
    ///
    /// Returns `None` when every node has an incoming edge.
    pub fn find_start_node(&self) -> Option<&Node> {
        self.entry_points().into_iter().next()
    }

    /// Require exactly one entry node. Intended for save/export time checks.
    pub fn validate_entry_point(&self) -> Result<&Node, CoreError> {
        if self.nodes.is_empty() {
            return Err(CoreError::Validation("scenario has no nodes".to_string()));
        }
        let entries = self.entry_points();
        match entries.as_slice() {
            [single] => Ok(*single),
            [] => Err(CoreError::Validation(
                "scenario has no entry point: every node has an incoming edge".to_string(),
            )),
            many => Err(CoreError::Validation(format!(
                "scenario has {} entry points ({}); exactly one is required",
                many.len(),
                many.iter()
                    .map(|n| n.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Resolve the next node from `node_id`.
    ///
    /// With a handle, returns the target of the edge bound to that handle.
    /// Without one, returns the target only when exactly one outgoing edge
    /// uses the default handle; ambiguous cases resolve to `None`.
    pub fn find_next(&self, node_id: &str, handle: Option<&str>) -> Option<&NodeId> {
        match handle {
            Some(raw) => self.slot_target(node_id, SourceHandle::parse(Some(raw))),
            None => {
                let mut defaults = self
                    .edges
                    .values()
                    .filter(|e| e.source == node_id && e.handle().is_default());
                match (defaults.next(), defaults.next()) {
                    (Some(edge), None) => Some(&edge.target),
                    _ => None,
                }
            }
        }
    }

    /// Target of the edge bound to `button-handle-<choice_id>` on `node_id`.
    pub fn choice_target(&self, node_id: &str, choice_id: &str) -> Option<&NodeId> {
        self.slot_target(node_id, SourceHandle::Choice(choice_id.to_string()))
    }

    /// Compatibility view of a choice's `nextStepId`, derived from edges.
    pub fn next_step_id(&self, node_id: &str, choice_id: &str) -> Option<&NodeId> {
        self.choice_target(node_id, choice_id)
    }

    fn slot_target(&self, node_id: &str, handle: SourceHandle) -> Option<&NodeId> {
        let edge_id = self.slots.get(&(node_id.to_string(), handle))?;
        self.edges.get(edge_id).map(|e| &e.target)
    }

    // -----------------------------------------------------------------------
    // Node mutations
    // -----------------------------------------------------------------------

    /// Create a node with a generated id and empty content.
    pub fn add_node(&mut self, node_type: &str, position: Position) -> NodeId {
        let id = new_id();
        self.nodes
            .insert(id.clone(), Node::new(id.clone(), node_type, position));
        tracing::debug!(node_id = %id, node_type, "Node added");
        id
    }

    /// Insert a fully-formed node. Fails with `Conflict` if the id exists.
    pub fn insert_node(&mut self, node: Node) -> Result<(), CoreError> {
        if self.nodes.contains_key(&node.id) {
            return Err(CoreError::Conflict(format!(
                "node '{}' already exists",
                node.id
            )));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node_id: &str) -> Option<Node> {
        let incident: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.source == node_id || e.target == node_id)
            .map(|e| e.id.clone())
            .collect();
        for edge_id in incident {
            self.disconnect(&edge_id);
        }
        let removed = self.nodes.shift_remove(node_id);
        if removed.is_some() {
            tracing::debug!(node_id, "Node removed");
        }
        removed
    }

    pub fn set_position(&mut self, node_id: &str, position: Position) -> Result<(), CoreError> {
        self.node_entry(node_id)?.position = position;
        Ok(())
    }

    pub fn set_media(&mut self, node_id: &str, media_id: Option<AssetId>) -> Result<(), CoreError> {
        self.node_entry(node_id)?.data.media_id = media_id;
        Ok(())
    }

    pub fn set_audio(&mut self, node_id: &str, audio_id: Option<AssetId>) -> Result<(), CoreError> {
        self.node_entry(node_id)?.data.audio_id = audio_id;
        Ok(())
    }

    /// Edit a node's content in place.
    ///
    /// Choices removed by `edit` keep their edges; use
    /// [`remove_choice`](Self::remove_choice) to drop a choice together with
    /// its edge.
    pub fn update_content<F>(&mut self, node_id: &str, edit: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut NodeContent),
    {
        edit(&mut self.node_entry(node_id)?.data.content);
        Ok(())
    }

    /// Append a choice with a generated id.
    pub fn add_choice(&mut self, node_id: &str, text: &str) -> Result<ChoiceId, CoreError> {
        let id = new_id();
        self.node_entry(node_id)?.data.content.choices.push(Choice {
            id: id.clone(),
            text: text.to_string(),
        });
        Ok(id)
    }

    /// Remove a choice and disconnect the edge bound to its handle.
    pub fn remove_choice(
        &mut self,
        node_id: &str,
        choice_id: &str,
    ) -> Result<Option<Choice>, CoreError> {
        let choices = &mut self.node_entry(node_id)?.data.content.choices;
        let removed = choices
            .iter()
            .position(|c| c.id == choice_id)
            .map(|idx| choices.remove(idx));

        let slot = (node_id.to_string(), SourceHandle::Choice(choice_id.to_string()));
        if let Some(edge_id) = self.slots.get(&slot).cloned() {
            self.disconnect(&edge_id);
        }
        Ok(removed)
    }

    fn node_entry(&mut self, node_id: &str) -> Result<&mut Node, CoreError> {
        self.nodes.get_mut(node_id).ok_or_else(|| CoreError::NotFound {
            entity: "node",
            id: node_id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Edge mutations
    // -----------------------------------------------------------------------

    /// Connect `source` to `target` through `handle`.
    ///
    /// Fails with `NotFound` when either endpoint is missing. A self-loop is
    /// ignored. Any edge already occupying the `(source, handle)` slot is
    /// replaced.
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        handle: Option<&str>,
    ) -> Result<ConnectOutcome, CoreError> {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(endpoint) {
                return Err(CoreError::NotFound {
                    entity: "node",
                    id: endpoint.to_string(),
                });
            }
        }
        if source == target {
            tracing::debug!(node_id = source, "Ignoring self-loop connection");
            return Ok(ConnectOutcome::SelfLoopIgnored);
        }

        let slot = (source.to_string(), SourceHandle::parse(handle));
        let replaced = self
            .slots
            .remove(&slot)
            .and_then(|old| self.edges.shift_remove(&old));

        let edge_id = format!("edge-{}", new_id());
        let edge = Edge {
            id: edge_id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: handle.map(str::to_string),
            data: None,
        };
        tracing::debug!(
            edge_id = %edge_id,
            source,
            target,
            handle = %slot.1,
            replaced = replaced.is_some(),
            "Nodes connected",
        );
        self.slots.insert(slot, edge_id.clone());
        self.edges.insert(edge_id.clone(), edge);

        Ok(ConnectOutcome::Connected { edge_id, replaced })
    }

    /// Remove an edge. Removing an unknown id is a no-op returning `None`.
    pub fn disconnect(&mut self, edge_id: &str) -> Option<Edge> {
        let edge = self.edges.shift_remove(edge_id)?;
        let slot = (edge.source.clone(), edge.handle());
        if self.slots.get(&slot).map(String::as_str) == Some(edge_id) {
            self.slots.remove(&slot);
        }
        tracing::debug!(edge_id, source = %edge.source, target = %edge.target, "Edge removed");
        Some(edge)
    }

    /// Set or clear the label carried in `edge.data.label`.
    pub fn set_edge_label(&mut self, edge_id: &str, label: Option<String>) -> Result<(), CoreError> {
        let edge = self.edges.get_mut(edge_id).ok_or_else(|| CoreError::NotFound {
            entity: "edge",
            id: edge_id.to_string(),
        })?;
        edge.data.get_or_insert_with(Default::default).label = label;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
