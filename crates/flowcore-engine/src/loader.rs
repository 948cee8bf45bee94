//! Static graph payload (wire version "1") and its loader.
//!
//! The loader turns a submitted payload into a [`CoreGraph`]. Decoding is
//! strict: unknown node/edge types fail instead of defaulting. Missing `data`
//! fields fall back per the submission contract — visibility defaults to
//! `PUBLIC`, the service id is derived from the node-id prefix.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;
use crate::graph::{CoreEdge, CoreGraph, CoreNode};
use crate::merge::assign_zoom_levels;
use crate::types::{EdgeType, NodeType, Visibility};

const PAYLOAD_VERSION: &str = "1";

/// A submitted static graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPayload {
    #[serde(default = "default_version")]
    pub version: String,
    pub graph_id: String,
    #[serde(default)]
    pub nodes: Vec<NodePayload>,
    #[serde(default)]
    pub edges: Vec<EdgePayload>,
}

fn default_version() -> String {
    PAYLOAD_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePayload {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgePayload {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

/// Cheap ingress-side check: enum strings parse, ids are present and unique.
/// The full graph build happens later on a worker via [`load`].
pub fn validate_payload(payload: &GraphPayload) -> Result<(), EngineError> {
    if payload.graph_id.is_empty() {
        return Err(EngineError::MissingField { field: "graphId" });
    }
    let mut node_ids = BTreeSet::new();
    for node in &payload.nodes {
        if node.id.is_empty() {
            return Err(EngineError::MissingField { field: "node.id" });
        }
        node.node_type.parse::<NodeType>()?;
        if let Some(visibility) = node.data.get("visibility").and_then(Value::as_str) {
            visibility.parse::<Visibility>()?;
        }
        if !node_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNode {
                id: node.id.clone(),
            });
        }
    }
    let mut edge_ids = BTreeSet::new();
    for edge in &payload.edges {
        if edge.id.is_empty() {
            return Err(EngineError::MissingField { field: "edge.id" });
        }
        edge.edge_type.parse::<EdgeType>()?;
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(EngineError::DuplicateEdge {
                id: edge.id.clone(),
            });
        }
    }
    Ok(())
}

/// Build a [`CoreGraph`] from a submitted payload. Zoom levels are assigned
/// by policy so the graph is sliceable before any trace has merged.
pub fn load(payload: &GraphPayload) -> Result<CoreGraph, EngineError> {
    validate_payload(payload)?;

    let mut graph = CoreGraph::new(payload.version.clone());
    for node in &payload.nodes {
        graph.add_node(build_node(node)?)?;
    }
    for edge in &payload.edges {
        graph.add_edge(CoreEdge::new(
            edge.id.clone(),
            edge.from.clone(),
            edge.to.clone(),
            edge.edge_type.parse()?,
        ))?;
    }
    assign_zoom_levels(&mut graph);
    Ok(graph)
}

fn build_node(payload: &NodePayload) -> Result<CoreNode, EngineError> {
    let visibility = match payload.data.get("visibility").and_then(Value::as_str) {
        Some(raw) => raw.parse()?,
        None => Visibility::Public,
    };
    let service_id = payload
        .data
        .get("serviceId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| derive_service_id(&payload.id));
    let name = payload
        .name
        .clone()
        .unwrap_or_else(|| payload.id.clone());

    let mut node = CoreNode::new(payload.id.clone(), name, payload.node_type.parse()?)
        .with_service_id(service_id)
        .with_visibility(visibility);
    for (key, value) in &payload.data {
        if key != "visibility" && key != "serviceId" {
            node.set_metadata(key.clone(), value.clone());
        }
    }
    Ok(node)
}

/// Service id fallback: the node-id segment before the first `.`.
pub fn derive_service_id(node_id: &str) -> String {
    node_id
        .split('.')
        .next()
        .unwrap_or(node_id)
        .to_string()
}
