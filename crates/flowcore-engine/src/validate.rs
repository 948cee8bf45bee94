//! Read-only structural validation, run at the end of every merge.

use crate::graph::CoreGraph;

/// Check the graph invariants. Returns human-readable violations.
///
/// Strict mode additionally rejects self-loops and requires every node to
/// have an assigned zoom level. Strict mode is intentionally limited to
/// those two rules.
pub fn validate_graph(graph: &CoreGraph, strict: bool) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for edge in graph.edges() {
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !graph.contains_node(endpoint) {
                errors.push(format!(
                    "Edge {} references unknown node: {}",
                    edge.id, endpoint
                ));
            }
        }
        if strict && edge.source_id == edge.target_id {
            errors.push(format!("Edge {} is a self-loop", edge.id));
        }
    }

    if strict {
        for node in graph.nodes() {
            if node.zoom_level.is_none() {
                errors.push(format!("Node {} has no zoom level assigned", node.id));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
