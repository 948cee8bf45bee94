//! Cypher serialization of merged graphs for the external analytics store.
//!
//! Statement order is fixed: one graph `MERGE`, then a `CREATE` per node,
//! then a `MATCH … CREATE` per edge. The core never interprets Cypher —
//! statements are handed to an external driver verbatim.

use serde_json::Value;

use crate::graph::{CoreEdge, CoreGraph, CoreNode};

const STATEMENT_DELIMITER: &str = ";";

/// Builds Cypher statements from an in-memory graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct CypherExporter;

impl CypherExporter {
    pub fn new() -> Self {
        Self
    }

    /// Serialize the graph. Each returned statement is `;`-terminated.
    pub fn export(&self, graph_id: &str, graph: &CoreGraph) -> Vec<String> {
        let mut statements = Vec::with_capacity(1 + graph.node_count() + graph.edge_count());
        statements.push(self.graph_statement(graph_id, graph));
        for node in graph.nodes() {
            statements.push(self.node_statement(graph_id, node));
        }
        for edge in graph.edges() {
            statements.push(self.edge_statement(graph_id, edge));
        }
        statements
    }

    fn graph_statement(&self, graph_id: &str, graph: &CoreGraph) -> String {
        format!(
            "MERGE (g:FlowGraph {{graphId: '{}'}}) \
             SET g.nodeCount = {}, g.edgeCount = {}, g.version = '{}', g.updatedAt = timestamp(){}",
            escape(graph_id),
            graph.node_count(),
            graph.edge_count(),
            escape(&graph.version),
            STATEMENT_DELIMITER
        )
    }

    fn node_statement(&self, graph_id: &str, node: &CoreNode) -> String {
        let mut props = format!(
            "id: '{}', graphId: '{}', name: '{}', type: '{}', serviceId: '{}', \
             visibility: '{}', zoomLevel: {}",
            escape(&node.id),
            escape(graph_id),
            escape(&node.name),
            node.node_type,
            escape(&node.service_id),
            node.visibility,
            node.zoom_level.map(|zoom| zoom.level()).unwrap_or(0)
        );
        for (key, value) in &node.metadata {
            props.push_str(", ");
            props.push_str(&escape(key));
            props.push_str(": ");
            props.push_str(&format_property_value(value));
        }
        format!(
            "CREATE (n{}:FlowNode {{{}}}){}",
            sanitize_identifier(&node.id),
            props,
            STATEMENT_DELIMITER
        )
    }

    fn edge_statement(&self, graph_id: &str, edge: &CoreEdge) -> String {
        format!(
            "MATCH (s:FlowNode {{id: '{}', graphId: '{}'}}), \
             (t:FlowNode {{id: '{}', graphId: '{}'}}) \
             CREATE (s)-[e:{} {{id: '{}', executionCount: {}}}]->(t){}",
            escape(&edge.source_id),
            escape(graph_id),
            escape(&edge.target_id),
            escape(graph_id),
            edge.edge_type,
            escape(&edge.id),
            edge.execution_count,
            STATEMENT_DELIMITER
        )
    }
}

/// Node-id to Cypher identifier: everything outside `[A-Za-z0-9_]` becomes `_`.
fn sanitize_identifier(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Single-quote escaping for string literals.
fn escape(value: &str) -> String {
    value.replace('\'', "\\'")
}

/// Numbers are emitted unquoted; strings are quoted and escaped; anything
/// else is coerced to its JSON text and quoted.
fn format_property_value(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", escape(s)),
        other => format!("'{}'", escape(&other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CoreEdge, CoreNode};
    use crate::types::{EdgeType, NodeType, ZoomLevel};
    use serde_json::json;

    fn sample_graph() -> CoreGraph {
        let mut graph = CoreGraph::new("2.1");
        let mut controller = CoreNode::new("orders.controller", "OrderController", NodeType::Endpoint)
            .with_service_id("orders");
        controller.zoom_level = Some(ZoomLevel::Business);
        controller.set_metadata("duration", json!(12.5));
        controller.set_metadata("owner", json!("checkout's team"));
        graph.add_node(controller).unwrap();

        let mut service = CoreNode::new("orders.service", "OrderService", NodeType::Method)
            .with_service_id("orders");
        service.zoom_level = Some(ZoomLevel::Public);
        graph.add_node(service).unwrap();

        let mut edge = CoreEdge::new("e1", "orders.controller", "orders.service", EdgeType::Call);
        edge.execution_count = 3;
        graph.add_edge(edge).unwrap();
        graph
    }

    #[test]
    fn statement_order_is_graph_then_nodes_then_edges() {
        let statements = CypherExporter::new().export("orders", &sample_graph());
        assert_eq!(statements.len(), 4);
        assert!(statements[0].starts_with("MERGE (g:FlowGraph"));
        assert!(statements[1].starts_with("CREATE (n"));
        assert!(statements[2].starts_with("CREATE (n"));
        assert!(statements[3].starts_with("MATCH (s:FlowNode"));
        for statement in &statements {
            assert!(statement.ends_with(';'));
        }
    }

    #[test]
    fn graph_statement_carries_counts_and_version() {
        let statements = CypherExporter::new().export("orders", &sample_graph());
        assert!(statements[0].contains("g.nodeCount = 2"));
        assert!(statements[0].contains("g.edgeCount = 1"));
        assert!(statements[0].contains("g.version = '2.1'"));
    }

    #[test]
    fn node_ids_are_sanitized_into_identifiers() {
        let statements = CypherExporter::new().export("orders", &sample_graph());
        assert!(statements[1].contains("CREATE (norders_controller:FlowNode"));
        assert!(statements[1].contains("id: 'orders.controller'"));
        assert!(statements[1].contains("type: 'ENDPOINT'"));
        assert!(statements[1].contains("zoomLevel: 1"));
    }

    #[test]
    fn metadata_values_are_typed() {
        let statements = CypherExporter::new().export("orders", &sample_graph());
        // Numbers unquoted, strings quoted with escaped apostrophes.
        assert!(statements[1].contains("duration: 12.5"));
        assert!(statements[1].contains("owner: 'checkout\\'s team'"));
    }

    #[test]
    fn edge_statement_matches_both_endpoints() {
        let statements = CypherExporter::new().export("orders", &sample_graph());
        let edge = &statements[3];
        assert!(edge.contains("MATCH (s:FlowNode {id: 'orders.controller', graphId: 'orders'})"));
        assert!(edge.contains("(t:FlowNode {id: 'orders.service', graphId: 'orders'})"));
        assert!(edge.contains("CREATE (s)-[e:CALL {id: 'e1', executionCount: 3}]->(t)"));
    }

    #[test]
    fn structural_round_trip_counts_match() {
        let graph = sample_graph();
        let statements = CypherExporter::new().export("orders", &graph);
        let node_creates = statements
            .iter()
            .filter(|s| s.contains(":FlowNode {") && s.starts_with("CREATE"))
            .count();
        let edge_creates = statements
            .iter()
            .filter(|s| s.starts_with("MATCH"))
            .count();
        assert_eq!(node_creates, graph.node_count());
        assert_eq!(edge_creates, graph.edge_count());

        // Every id matched by an edge appears in a preceding node CREATE.
        for edge in graph.edges() {
            let edge_position = statements
                .iter()
                .position(|s| s.contains(&format!("id: '{}', executionCount", edge.id)))
                .unwrap();
            for endpoint in [&edge.source_id, &edge.target_id] {
                let node_position = statements
                    .iter()
                    .position(|s| s.starts_with("CREATE") && s.contains(&format!("id: '{}'", endpoint)))
                    .unwrap();
                assert!(node_position < edge_position);
            }
        }
    }
}
