//! The directed multigraph at the center of the pipeline.
//!
//! **Invariant**: `nodes` and `edges` use `BTreeMap`, never `HashMap` —
//! HashMap iteration order is nondeterministic, and the merge engine's
//! byte-identical-output guarantee depends on deterministic ordering.
//! Adjacency lists (`outgoing`/`incoming`) keep edge-ids in insertion order;
//! BFS extraction and edge lookup iterate them in that order.
//!
//! A `CoreGraph` is mutated only while it is being constructed or merged.
//! Once published through a store it is treated as an immutable snapshot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;
use crate::types::{EdgeType, NodeType, Visibility, ZoomLevel};

/// A typed node. `zoom_level` is `None` until the zoom policy assigns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub service_id: String,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_level: Option<ZoomLevel>,
    /// Open extension point: duration, executionCount, errorCount,
    /// checkpoints, and any custom attributes from the submitter.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl CoreNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            service_id: String::new(),
            visibility: Visibility::Public,
            zoom_level: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = service_id.into();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Replaces any prior value stored under `key`.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// A typed directed edge. `execution_count` is monotonically non-decreasing
/// over the graph's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl CoreEdge {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            execution_count: 0,
            metadata: BTreeMap::new(),
        }
    }
}

/// A versioned directed multigraph of typed nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreGraph {
    /// Opaque version string attached by the submitter.
    pub version: String,
    nodes: BTreeMap<String, CoreNode>,
    edges: BTreeMap<String, CoreEdge>,
    outgoing: BTreeMap<String, Vec<String>>,
    incoming: BTreeMap<String, Vec<String>>,
    /// Trace-ids already folded into this graph. Re-merging one of these is
    /// an identity transformation.
    #[serde(default)]
    merged_traces: BTreeSet<String>,
}

impl CoreGraph {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
            merged_traces: BTreeSet::new(),
        }
    }

    // -- mutation (construction / merge only) --

    pub fn add_node(&mut self, node: CoreNode) -> Result<(), EngineError> {
        if self.nodes.contains_key(&node.id) {
            return Err(EngineError::DuplicateNode { id: node.id });
        }
        self.outgoing.entry(node.id.clone()).or_default();
        self.incoming.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Fails with `InvalidReference` when either endpoint is absent at the
    /// moment of insertion.
    pub fn add_edge(&mut self, edge: CoreEdge) -> Result<(), EngineError> {
        if self.edges.contains_key(&edge.id) {
            return Err(EngineError::DuplicateEdge { id: edge.id });
        }
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !self.nodes.contains_key(endpoint) {
                return Err(EngineError::InvalidReference {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
        self.outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.target_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    pub(crate) fn node_mut(&mut self, node_id: &str) -> Option<&mut CoreNode> {
        self.nodes.get_mut(node_id)
    }

    pub(crate) fn edge_mut(&mut self, edge_id: &str) -> Option<&mut CoreEdge> {
        self.edges.get_mut(edge_id)
    }

    pub(crate) fn mark_trace_merged(&mut self, trace_id: &str) {
        self.merged_traces.insert(trace_id.to_string());
    }

    // -- read access --

    pub fn node(&self, node_id: &str) -> Option<&CoreNode> {
        self.nodes.get(node_id)
    }

    pub fn edge(&self, edge_id: &str) -> Option<&CoreEdge> {
        self.edges.get(edge_id)
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Edge-ids leaving `node_id`, in insertion order.
    pub fn outgoing(&self, node_id: &str) -> &[String] {
        self.outgoing.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edge-ids arriving at `node_id`, in insertion order.
    pub fn incoming(&self, node_id: &str) -> &[String] {
        self.incoming.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First edge (in the source's insertion order) connecting the ordered
    /// pair, regardless of type.
    pub fn edge_between(&self, source_id: &str, target_id: &str) -> Option<&CoreEdge> {
        self.outgoing(source_id)
            .iter()
            .filter_map(|edge_id| self.edges.get(edge_id))
            .find(|edge| edge.target_id == target_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CoreNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CoreEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes_at_zoom(&self, level: ZoomLevel) -> Vec<&CoreNode> {
        self.nodes
            .values()
            .filter(|node| node.zoom_level == Some(level))
            .collect()
    }

    pub fn has_merged_trace(&self, trace_id: &str) -> bool {
        self.merged_traces.contains(trace_id)
    }

    /// Detached copy of the current state. Callers own the copy; mutating it
    /// never affects the original.
    pub fn snapshot(&self) -> CoreGraph {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(id: &str) -> CoreNode {
        CoreNode::new(id, id, NodeType::Method)
    }

    #[test]
    fn add_edge_requires_both_endpoints() {
        let mut graph = CoreGraph::new("1");
        graph.add_node(method("a")).unwrap();

        let err = graph
            .add_edge(CoreEdge::new("e1", "a", "missing", EdgeType::Call))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidReference { ref node_id, .. } if node_id == "missing"
        ));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.outgoing("a").is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut graph = CoreGraph::new("1");
        graph.add_node(method("a")).unwrap();
        graph.add_node(method("b")).unwrap();
        graph
            .add_edge(CoreEdge::new("e1", "a", "b", EdgeType::Call))
            .unwrap();

        assert!(matches!(
            graph.add_node(method("a")),
            Err(EngineError::DuplicateNode { .. })
        ));
        assert!(matches!(
            graph.add_edge(CoreEdge::new("e1", "b", "a", EdgeType::Call)),
            Err(EngineError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn adjacency_preserves_insertion_order() {
        let mut graph = CoreGraph::new("1");
        for id in ["a", "z", "m"] {
            graph.add_node(method(id)).unwrap();
        }
        graph
            .add_edge(CoreEdge::new("e-z", "a", "z", EdgeType::Call))
            .unwrap();
        graph
            .add_edge(CoreEdge::new("e-m", "a", "m", EdgeType::Call))
            .unwrap();

        // Insertion order, not the BTreeMap's id order.
        assert_eq!(graph.outgoing("a"), ["e-z".to_string(), "e-m".to_string()]);
        assert_eq!(graph.incoming("m"), ["e-m".to_string()]);
    }

    #[test]
    fn edge_between_finds_first_in_insertion_order() {
        let mut graph = CoreGraph::new("1");
        graph.add_node(method("a")).unwrap();
        graph.add_node(method("b")).unwrap();
        graph
            .add_edge(CoreEdge::new("e2", "a", "b", EdgeType::Call))
            .unwrap();
        graph
            .add_edge(CoreEdge::new("e1", "a", "b", EdgeType::RuntimeCall))
            .unwrap();

        assert_eq!(graph.edge_between("a", "b").unwrap().id, "e2");
        assert!(graph.edge_between("b", "a").is_none());
    }

    #[test]
    fn snapshot_is_detached() {
        let mut graph = CoreGraph::new("1");
        graph.add_node(method("a")).unwrap();
        let snapshot = graph.snapshot();

        graph.add_node(method("b")).unwrap();
        assert_eq!(snapshot.node_count(), 1);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn nodes_at_zoom_filters_on_assigned_levels() {
        let mut graph = CoreGraph::new("1");
        let mut business = CoreNode::new("endpoint", "endpoint", NodeType::Endpoint);
        business.zoom_level = Some(ZoomLevel::Business);
        graph.add_node(business).unwrap();
        graph.add_node(method("unassigned")).unwrap();

        let at_business = graph.nodes_at_zoom(ZoomLevel::Business);
        assert_eq!(at_business.len(), 1);
        assert_eq!(at_business[0].id, "endpoint");
        assert!(graph.nodes_at_zoom(ZoomLevel::Runtime).is_empty());
    }

    #[test]
    fn metadata_writes_replace_prior_values() {
        let mut node = method("a");
        node.set_metadata("duration", Value::from(10));
        node.set_metadata("duration", Value::from(25));
        assert_eq!(node.metadata("duration"), Some(&Value::from(25)));
    }
}
