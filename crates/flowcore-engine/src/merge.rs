//! Deterministic merge of a completed trace into a graph snapshot.
//!
//! The transformation is a pipeline of idempotent stages applied in a fixed
//! order: runtime nodes, runtime edges, durations, checkpoints, async hops,
//! errors, then the zoom-level policy for any node still unassigned. Given
//! the same input graph and the same events in the same submission order the
//! output is byte-identical.
//!
//! A graph remembers which trace-ids it has absorbed; merging one of those
//! again returns an identical graph, so re-running a merge is always safe.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::errors::EngineError;
use crate::graph::{CoreEdge, CoreGraph, CoreNode};
use crate::loader::derive_service_id;
use crate::runtime::RuntimeEvent;
use crate::types::{EventType, NodeType, Visibility, ZoomLevel};

pub const METADATA_DURATION: &str = "duration";
pub const METADATA_EXECUTION_COUNT: &str = "executionCount";
pub const METADATA_CHECKPOINTS: &str = "checkpoints";
pub const METADATA_ERROR_COUNT: &str = "errorCount";
pub const METADATA_LAST_ERROR: &str = "lastError";
pub const METADATA_ASYNC_HOPS: &str = "asyncHops";

/// Folds runtime traces into static graphs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Produce a new graph with `events` folded in. The input graph is not
    /// modified. Events must be in submission order.
    pub fn merge(
        &self,
        graph: &CoreGraph,
        trace_id: &str,
        events: &[RuntimeEvent],
    ) -> Result<CoreGraph, EngineError> {
        if graph.has_merged_trace(trace_id) {
            return Ok(graph.snapshot());
        }

        let mut merged = graph.snapshot();
        add_runtime_nodes(&mut merged, events)?;
        add_runtime_edges(&mut merged, events)?;
        apply_durations(&mut merged, events);
        apply_checkpoints(&mut merged, events);
        apply_async_hops(&mut merged, events)?;
        apply_errors(&mut merged, events);
        assign_zoom_levels(&mut merged);
        merged.mark_trace_merged(trace_id);
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// Stage 1: runtime-discovered nodes
// ---------------------------------------------------------------------------

/// Every event naming a node absent from the graph contributes a synthetic
/// METHOD node at zoom level 5. Existing nodes are never overwritten.
fn add_runtime_nodes(graph: &mut CoreGraph, events: &[RuntimeEvent]) -> Result<(), EngineError> {
    for event in events {
        if graph.contains_node(&event.node_id) {
            continue;
        }
        let mut node = CoreNode::new(event.node_id.clone(), event.node_id.clone(), NodeType::Method)
            .with_service_id(derive_service_id(&event.node_id))
            .with_visibility(Visibility::Public);
        node.zoom_level = Some(ZoomLevel::Runtime);
        graph.add_node(node)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 2: runtime edges
// ---------------------------------------------------------------------------

/// Consecutive METHOD_ENTER pairs (and consecutive CHECKPOINT pairs) are
/// control transfers. Each ordered pair increments the connecting edge's
/// execution count, creating a RUNTIME_CALL edge first when no edge of any
/// type connects the pair yet.
fn add_runtime_edges(graph: &mut CoreGraph, events: &[RuntimeEvent]) -> Result<(), EngineError> {
    for pair in events.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let transfer = matches!(
            (prev.event_type, curr.event_type),
            (EventType::MethodEnter, EventType::MethodEnter)
                | (EventType::Checkpoint, EventType::Checkpoint)
        );
        if !transfer || prev.node_id == curr.node_id {
            continue;
        }
        let edge_id = match graph.edge_between(&prev.node_id, &curr.node_id) {
            Some(edge) => edge.id.clone(),
            None => {
                let id = format!("runtime:{}->{}", prev.node_id, curr.node_id);
                graph.add_edge(CoreEdge::new(
                    id.clone(),
                    prev.node_id.clone(),
                    curr.node_id.clone(),
                    crate::types::EdgeType::RuntimeCall,
                ))?;
                id
            }
        };
        if let Some(edge) = graph.edge_mut(&edge_id) {
            edge.execution_count += 1;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 3: durations
// ---------------------------------------------------------------------------

/// METHOD_EXIT events with a matching METHOD_ENTER (same span, enter not
/// after exit) fold `exit - enter` into the entered node's running-average
/// `duration` and bump its `executionCount`.
fn apply_durations(graph: &mut CoreGraph, events: &[RuntimeEvent]) {
    let mut open_spans: BTreeMap<String, (String, DateTime<Utc>)> = BTreeMap::new();
    for event in events {
        let Some(span_id) = &event.span_id else {
            continue;
        };
        match event.event_type {
            EventType::MethodEnter => {
                open_spans
                    .entry(span_id.clone())
                    .or_insert_with(|| (event.node_id.clone(), event.timestamp));
            }
            EventType::MethodExit => {
                let Some((node_id, entered_at)) = open_spans.get(span_id).cloned() else {
                    continue;
                };
                if entered_at > event.timestamp {
                    continue;
                }
                open_spans.remove(span_id);
                let elapsed = (event.timestamp - entered_at).num_milliseconds() as f64;
                record_duration(graph, &node_id, elapsed);
            }
            _ => {}
        }
    }
}

fn record_duration(graph: &mut CoreGraph, node_id: &str, elapsed_ms: f64) {
    let Some(node) = graph.node_mut(node_id) else {
        return;
    };
    let executions = node
        .metadata(METADATA_EXECUTION_COUNT)
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let average = node
        .metadata(METADATA_DURATION)
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let executions = executions + 1;
    let average = average + (elapsed_ms - average) / executions as f64;
    node.set_metadata(METADATA_DURATION, Value::from(average));
    node.set_metadata(METADATA_EXECUTION_COUNT, Value::from(executions));
}

// ---------------------------------------------------------------------------
// Stage 4: checkpoints
// ---------------------------------------------------------------------------

fn apply_checkpoints(graph: &mut CoreGraph, events: &[RuntimeEvent]) {
    for event in events {
        if event.event_type != EventType::Checkpoint {
            continue;
        }
        let name = event
            .attributes
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed")
            .to_string();
        let record = json!({
            "name": name,
            "timestamp": event.timestamp.timestamp_millis(),
            "data": event.attributes,
        });
        append_to_array(graph, &event.node_id, METADATA_CHECKPOINTS, record);
    }
}

fn append_to_array(graph: &mut CoreGraph, node_id: &str, key: &str, record: Value) {
    let Some(node) = graph.node_mut(node_id) else {
        return;
    };
    match node.metadata.get_mut(key) {
        Some(Value::Array(entries)) => entries.push(record),
        _ => node.set_metadata(key, Value::Array(vec![record])),
    }
}

// ---------------------------------------------------------------------------
// Stage 5: async hops
// ---------------------------------------------------------------------------

/// PRODUCE_TOPIC / CONSUME_TOPIC pairs sharing a correlation id become hop
/// records on the edge between producer and consumer, with a derived
/// FLOWS_TO edge created when no edge connects the pair. Events without a
/// correlation id produce no hops; that is observable but not an error.
fn apply_async_hops(graph: &mut CoreGraph, events: &[RuntimeEvent]) -> Result<(), EngineError> {
    let mut pending: BTreeMap<String, VecDeque<(String, DateTime<Utc>)>> = BTreeMap::new();
    for event in events {
        let Some(correlation) = event.correlation().map(str::to_string) else {
            continue;
        };
        match event.event_type {
            EventType::ProduceTopic => {
                pending
                    .entry(correlation)
                    .or_default()
                    .push_back((event.node_id.clone(), event.timestamp));
            }
            EventType::ConsumeTopic => {
                let Some((producer, produced_at)) = pending
                    .get_mut(&correlation)
                    .and_then(VecDeque::pop_front)
                else {
                    continue;
                };
                if producer == event.node_id {
                    continue;
                }
                let edge_id = match graph.edge_between(&producer, &event.node_id) {
                    Some(edge) => edge.id.clone(),
                    None => {
                        let id = format!("flow:{}->{}", producer, event.node_id);
                        graph.add_edge(CoreEdge::new(
                            id.clone(),
                            producer.clone(),
                            event.node_id.clone(),
                            crate::types::EdgeType::FlowsTo,
                        ))?;
                        id
                    }
                };
                let hop = json!({
                    "correlationId": correlation,
                    "producedAt": produced_at.timestamp_millis(),
                    "consumedAt": event.timestamp.timestamp_millis(),
                });
                if let Some(edge) = graph.edge_mut(&edge_id) {
                    match edge.metadata.get_mut(METADATA_ASYNC_HOPS) {
                        Some(Value::Array(entries)) => entries.push(hop),
                        _ => {
                            edge.metadata
                                .insert(METADATA_ASYNC_HOPS.to_string(), Value::Array(vec![hop]));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage 6: errors
// ---------------------------------------------------------------------------

/// ERROR events bump the node's `errorCount`; the most recent error's
/// message and class land in `lastError`.
fn apply_errors(graph: &mut CoreGraph, events: &[RuntimeEvent]) {
    for event in events {
        if event.event_type != EventType::Error {
            continue;
        }
        let Some(node) = graph.node_mut(&event.node_id) else {
            continue;
        };
        let count = node
            .metadata(METADATA_ERROR_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        node.set_metadata(METADATA_ERROR_COUNT, Value::from(count + 1));
        node.set_metadata(
            METADATA_LAST_ERROR,
            json!({
                "message": event.error_message,
                "type": event.error_type,
            }),
        );
    }
}

// ---------------------------------------------------------------------------
// Zoom-level policy
// ---------------------------------------------------------------------------

/// Assign a zoom level to every node that does not have one yet. Levels,
/// once assigned, are preserved across future merges.
pub(crate) fn assign_zoom_levels(graph: &mut CoreGraph) {
    let unassigned: Vec<String> = graph
        .nodes()
        .filter(|node| node.zoom_level.is_none())
        .map(|node| node.id.clone())
        .collect();
    for node_id in unassigned {
        let Some(node) = graph.node_mut(&node_id) else {
            continue;
        };
        node.zoom_level = Some(policy_level(node.node_type, node.visibility));
    }
}

fn policy_level(node_type: NodeType, visibility: Visibility) -> ZoomLevel {
    match node_type {
        NodeType::Endpoint | NodeType::Topic => ZoomLevel::Business,
        NodeType::Service | NodeType::Class | NodeType::Interface => ZoomLevel::Service,
        NodeType::Method | NodeType::Constructor => match visibility {
            Visibility::Public => ZoomLevel::Public,
            _ => ZoomLevel::Private,
        },
        NodeType::PrivateMethod | NodeType::Field => ZoomLevel::Private,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EdgeType;
    use std::collections::BTreeMap as Map;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn event(event_type: EventType, node_id: &str, span: Option<&str>, ms: i64) -> RuntimeEvent {
        RuntimeEvent {
            event_id: None,
            event_type,
            timestamp: at(ms),
            node_id: node_id.to_string(),
            span_id: span.map(str::to_string),
            parent_span_id: None,
            duration_ms: None,
            correlation_id: None,
            error_message: None,
            error_type: None,
            attributes: Map::new(),
        }
    }

    fn base_graph() -> CoreGraph {
        let mut graph = CoreGraph::new("1");
        graph
            .add_node(CoreNode::new("a", "a", NodeType::Method))
            .unwrap();
        graph
            .add_node(CoreNode::new("b", "b", NodeType::Method))
            .unwrap();
        graph
            .add_edge(CoreEdge::new("e1", "a", "b", EdgeType::Call))
            .unwrap();
        graph
    }

    #[test]
    fn discovers_runtime_nodes_at_zoom_five() {
        let events = vec![
            event(EventType::MethodEnter, "a", Some("s1"), 0),
            event(EventType::MethodEnter, "c", Some("s2"), 1),
            event(EventType::MethodExit, "c", Some("s2"), 2),
            event(EventType::MethodExit, "a", Some("s1"), 3),
        ];
        let merged = MergeEngine::new().merge(&base_graph(), "t1", &events).unwrap();

        assert_eq!(merged.node_count(), 3);
        let discovered = merged.node("c").unwrap();
        assert_eq!(discovered.zoom_level, Some(ZoomLevel::Runtime));
        assert_eq!(discovered.node_type, NodeType::Method);

        let edge = merged.edge_between("a", "c").unwrap();
        assert_eq!(edge.edge_type, EdgeType::RuntimeCall);
        assert_eq!(edge.execution_count, 1);
    }

    #[test]
    fn increments_existing_edge_instead_of_duplicating() {
        let events = vec![
            event(EventType::MethodEnter, "a", Some("s1"), 0),
            event(EventType::MethodEnter, "b", Some("s2"), 1),
        ];
        let merged = MergeEngine::new().merge(&base_graph(), "t1", &events).unwrap();

        assert_eq!(merged.edge_count(), 1);
        assert_eq!(merged.edge("e1").unwrap().execution_count, 1);
    }

    #[test]
    fn records_duration_as_running_average() {
        let engine = MergeEngine::new();
        let first = vec![
            event(EventType::MethodEnter, "a", Some("s1"), 100),
            event(EventType::MethodExit, "a", Some("s1"), 110),
        ];
        let second = vec![
            event(EventType::MethodEnter, "a", Some("s9"), 200),
            event(EventType::MethodExit, "a", Some("s9"), 230),
        ];
        let merged = engine.merge(&base_graph(), "t1", &first).unwrap();
        let merged = engine.merge(&merged, "t2", &second).unwrap();

        let node = merged.node("a").unwrap();
        assert_eq!(node.metadata(METADATA_DURATION).unwrap().as_f64(), Some(20.0));
        assert_eq!(
            node.metadata(METADATA_EXECUTION_COUNT).unwrap().as_u64(),
            Some(2)
        );
    }

    #[test]
    fn exit_without_enter_records_nothing() {
        let events = vec![event(EventType::MethodExit, "a", Some("s1"), 50)];
        let merged = MergeEngine::new().merge(&base_graph(), "t1", &events).unwrap();
        assert!(merged.node("a").unwrap().metadata(METADATA_DURATION).is_none());
    }

    #[test]
    fn exit_before_enter_is_tolerated() {
        // Events may arrive out of wall-clock order; a negative span is
        // ignored rather than producing a negative duration.
        let events = vec![
            event(EventType::MethodEnter, "a", Some("s1"), 100),
            event(EventType::MethodExit, "a", Some("s1"), 40),
        ];
        let merged = MergeEngine::new().merge(&base_graph(), "t1", &events).unwrap();
        assert!(merged.node("a").unwrap().metadata(METADATA_DURATION).is_none());
    }

    #[test]
    fn checkpoints_append_in_order() {
        let mut first = event(EventType::Checkpoint, "a", None, 10);
        first
            .attributes
            .insert("name".to_string(), Value::from("validated"));
        let second = event(EventType::Checkpoint, "a", None, 20);

        let merged = MergeEngine::new()
            .merge(&base_graph(), "t1", &[first, second])
            .unwrap();
        let checkpoints = merged
            .node("a")
            .unwrap()
            .metadata(METADATA_CHECKPOINTS)
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[0]["name"], "validated");
        assert_eq!(checkpoints[1]["name"], "unnamed");
    }

    #[test]
    fn errors_accumulate_and_last_error_wins() {
        let mut first = event(EventType::Error, "b", None, 10);
        first.error_message = Some("boom".to_string());
        first.error_type = Some("IllegalStateException".to_string());
        let mut second = event(EventType::Error, "b", None, 20);
        second.error_message = Some("still broken".to_string());
        second.error_type = Some("TimeoutException".to_string());

        let merged = MergeEngine::new()
            .merge(&base_graph(), "t1", &[first, second])
            .unwrap();
        let node = merged.node("b").unwrap();
        assert_eq!(node.metadata(METADATA_ERROR_COUNT).unwrap().as_u64(), Some(2));
        let last = node.metadata(METADATA_LAST_ERROR).unwrap();
        assert_eq!(last["type"], "TimeoutException");
        assert_eq!(last["message"], "still broken");
    }

    #[test]
    fn async_hop_creates_flows_to_edge() {
        let mut produce = event(EventType::ProduceTopic, "a", None, 10);
        produce.correlation_id = Some("corr-1".to_string());
        let mut consume = event(EventType::ConsumeTopic, "b", None, 25);
        consume.correlation_id = Some("corr-1".to_string());

        let mut graph = CoreGraph::new("1");
        graph
            .add_node(CoreNode::new("a", "a", NodeType::Method))
            .unwrap();
        graph
            .add_node(CoreNode::new("b", "b", NodeType::Method))
            .unwrap();

        let merged = MergeEngine::new()
            .merge(&graph, "t1", &[produce, consume])
            .unwrap();
        let edge = merged.edge_between("a", "b").unwrap();
        assert_eq!(edge.edge_type, EdgeType::FlowsTo);
        let hops = edge.metadata.get(METADATA_ASYNC_HOPS).unwrap().as_array().unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0]["correlationId"], "corr-1");
        assert_eq!(hops[0]["producedAt"], 10);
        assert_eq!(hops[0]["consumedAt"], 25);
    }

    #[test]
    fn unmatched_correlation_produces_no_hop() {
        let mut produce = event(EventType::ProduceTopic, "a", None, 10);
        produce.correlation_id = Some("corr-1".to_string());
        let mut consume = event(EventType::ConsumeTopic, "b", None, 25);
        consume.correlation_id = Some("corr-other".to_string());

        let merged = MergeEngine::new()
            .merge(&base_graph(), "t1", &[produce, consume])
            .unwrap();
        assert_eq!(merged.edge_count(), 1);
    }

    #[test]
    fn merge_is_idempotent_per_trace() {
        let events = vec![
            event(EventType::MethodEnter, "a", Some("s1"), 0),
            event(EventType::MethodEnter, "c", Some("s2"), 1),
            event(EventType::MethodExit, "c", Some("s2"), 5),
            event(EventType::MethodExit, "a", Some("s1"), 9),
        ];
        let engine = MergeEngine::new();
        let once = engine.merge(&base_graph(), "t1", &events).unwrap();
        let twice = engine.merge(&once, "t1", &events).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn disjoint_traces_commute() {
        let mut graph = base_graph();
        graph
            .add_node(CoreNode::new("x", "x", NodeType::Method))
            .unwrap();
        graph
            .add_node(CoreNode::new("y", "y", NodeType::Method))
            .unwrap();

        let t1 = vec![
            event(EventType::MethodEnter, "a", Some("s1"), 0),
            event(EventType::MethodEnter, "b", Some("s2"), 1),
        ];
        let t2 = vec![
            event(EventType::MethodEnter, "x", Some("s3"), 0),
            event(EventType::MethodEnter, "y", Some("s4"), 1),
        ];

        let engine = MergeEngine::new();
        let ab = engine.merge(&graph, "t1", &t1).unwrap();
        let ab = engine.merge(&ab, "t2", &t2).unwrap();
        let ba = engine.merge(&graph, "t2", &t2).unwrap();
        let ba = engine.merge(&ba, "t1", &t1).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn zoom_policy_covers_every_type() {
        assert_eq!(
            policy_level(NodeType::Endpoint, Visibility::Public),
            ZoomLevel::Business
        );
        assert_eq!(
            policy_level(NodeType::Topic, Visibility::Private),
            ZoomLevel::Business
        );
        assert_eq!(
            policy_level(NodeType::Service, Visibility::Public),
            ZoomLevel::Service
        );
        assert_eq!(
            policy_level(NodeType::Class, Visibility::Public),
            ZoomLevel::Service
        );
        assert_eq!(
            policy_level(NodeType::Interface, Visibility::Public),
            ZoomLevel::Service
        );
        assert_eq!(
            policy_level(NodeType::Method, Visibility::Public),
            ZoomLevel::Public
        );
        assert_eq!(
            policy_level(NodeType::Constructor, Visibility::Public),
            ZoomLevel::Public
        );
        assert_eq!(
            policy_level(NodeType::Method, Visibility::Protected),
            ZoomLevel::Private
        );
        assert_eq!(
            policy_level(NodeType::PrivateMethod, Visibility::Public),
            ZoomLevel::Private
        );
        assert_eq!(
            policy_level(NodeType::Field, Visibility::Public),
            ZoomLevel::Private
        );
    }

    #[test]
    fn assigned_zoom_levels_survive_merges() {
        let mut graph = base_graph();
        graph.node_mut("a").unwrap().zoom_level = Some(ZoomLevel::Business);

        let events = vec![event(EventType::MethodEnter, "a", Some("s1"), 0)];
        let merged = MergeEngine::new().merge(&graph, "t1", &events).unwrap();
        assert_eq!(merged.node("a").unwrap().zoom_level, Some(ZoomLevel::Business));
    }
}
