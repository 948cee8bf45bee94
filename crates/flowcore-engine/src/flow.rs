//! Zoom slicing and BFS flow extraction for visualization.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::graph::CoreGraph;
use crate::types::{NodeType, ZoomLevel};

/// One node visit within an extracted flow, in BFS order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    pub node_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_level: Option<ZoomLevel>,
    /// BFS distance from the flow's start node.
    pub depth: usize,
    /// Predecessors on minimum-depth paths to this node.
    pub parent_node_ids: BTreeSet<String>,
}

/// A BFS walk rooted at one entry node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowModel {
    pub start_node_id: String,
    pub steps: Vec<FlowStep>,
}

/// Produces zoom slices and BFS flows from graph snapshots. Stateless; the
/// input graph is never modified.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowExtractor;

impl FlowExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Subgraph at the requested zoom. The request counts from the top
    /// (0 = highest level, larger = more detail), so a node is included when
    /// its assigned level is at most `requested_level + 1`; an edge is
    /// included when both endpoints survive the filter.
    pub fn slice(&self, graph: &CoreGraph, requested_level: u8) -> CoreGraph {
        let cutoff = u16::from(requested_level) + 1;
        let mut sliced = CoreGraph::new(graph.version.clone());
        for node in graph.nodes() {
            let included = node
                .zoom_level
                .map(|zoom| u16::from(zoom.level()) <= cutoff)
                .unwrap_or(false);
            if included {
                // Source ids are unique, so adds cannot fail.
                let _ = sliced.add_node(node.clone());
            }
        }
        for edge in graph.edges() {
            if sliced.contains_node(&edge.source_id) && sliced.contains_node(&edge.target_id) {
                let _ = sliced.add_edge(edge.clone());
            }
        }
        sliced
    }

    /// BFS flows from every ENDPOINT and TOPIC node.
    pub fn extract_flows(&self, graph: &CoreGraph) -> Vec<FlowModel> {
        graph
            .nodes()
            .filter(|node| matches!(node.node_type, NodeType::Endpoint | NodeType::Topic))
            .filter_map(|node| self.extract_flow(graph, &node.id))
            .collect()
    }

    /// A single BFS flow rooted at `start_node_id`. Each node is visited at
    /// most once; cycles terminate the walk. `None` when the start node does
    /// not exist.
    pub fn extract_flow(&self, graph: &CoreGraph, start_node_id: &str) -> Option<FlowModel> {
        let start = graph.node(start_node_id)?;

        let mut steps = vec![FlowStep {
            node_id: start.id.clone(),
            name: start.name.clone(),
            zoom_level: start.zoom_level,
            depth: 0,
            parent_node_ids: BTreeSet::new(),
        }];
        let mut step_index: BTreeMap<String, usize> = BTreeMap::new();
        step_index.insert(start.id.clone(), 0);
        let mut queue = VecDeque::from([start.id.clone()]);

        while let Some(current) = queue.pop_front() {
            let Some(&current_index) = step_index.get(&current) else {
                continue;
            };
            let depth = steps[current_index].depth;
            for edge_id in graph.outgoing(&current) {
                let Some(edge) = graph.edge(edge_id) else {
                    continue;
                };
                match step_index.get(&edge.target_id) {
                    None => {
                        let Some(target) = graph.node(&edge.target_id) else {
                            continue;
                        };
                        step_index.insert(target.id.clone(), steps.len());
                        steps.push(FlowStep {
                            node_id: target.id.clone(),
                            name: target.name.clone(),
                            zoom_level: target.zoom_level,
                            depth: depth + 1,
                            parent_node_ids: BTreeSet::from([current.clone()]),
                        });
                        queue.push_back(target.id.clone());
                    }
                    Some(&seen_index) => {
                        // Another minimum-depth path into an already
                        // discovered node contributes a parent; deeper
                        // re-encounters are cycle edges and stop here.
                        if steps[seen_index].depth == depth + 1 {
                            steps[seen_index].parent_node_ids.insert(current.clone());
                        }
                    }
                }
            }
        }

        Some(FlowModel {
            start_node_id: start.id.clone(),
            steps,
        })
    }

    /// Steps along the flow from `from`, cut at the first visit of `to`
    /// (inclusive when reached). `None` when `from` does not exist.
    pub fn extract_path(
        &self,
        graph: &CoreGraph,
        from: &str,
        to: &str,
    ) -> Option<Vec<FlowStep>> {
        let flow = self.extract_flow(graph, from)?;
        let mut path: Vec<FlowStep> = flow
            .steps
            .iter()
            .take_while(|step| step.node_id != to)
            .cloned()
            .collect();
        if let Some(target) = flow.steps.iter().find(|step| step.node_id == to) {
            path.push(target.clone());
        }
        Some(path)
    }
}
