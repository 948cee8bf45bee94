//! Keyed, thread-safe registry of graphs and their metadata.
//!
//! The store owns the current graph value per graph-id; readers receive
//! `Arc` snapshots and never block writers. Every entry carries a revision
//! used by the merge coordinator's optimistic concurrency: a merge computed
//! against revision N only lands if the entry is still at revision N. All
//! expensive work (loading, merging) happens outside the lock — critical
//! sections are pointer swaps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flowcore_engine::CoreGraph;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;

/// Snapshot of a graph's bookkeeping, updated atomically with the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetadata {
    pub graph_id: String,
    pub version: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub has_runtime_data: bool,
    pub trace_count: u64,
}

struct GraphEntry {
    version: String,
    graph: Arc<CoreGraph>,
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    has_runtime_data: bool,
    trace_count: u64,
    revision: u64,
}

/// Result of an optimistic merged-graph swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The swap landed; the store now holds the merged graph.
    Applied,
    /// Someone replaced the graph since the merge snapshot was taken.
    Conflict,
    /// The graph was deleted; per contract the update is a no-op.
    Missing,
}

pub struct GraphStore {
    clock: Arc<dyn Clock>,
    graphs: RwLock<HashMap<String, GraphEntry>>,
}

impl GraphStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            graphs: RwLock::new(HashMap::new()),
        }
    }

    /// Store a freshly loaded static graph, replacing any prior value.
    /// `created_at` survives replacement; `last_updated_at` is set to now.
    pub fn put_static(&self, graph_id: &str, graph: CoreGraph) {
        let now = self.clock.now();
        let version = graph.version.clone();
        let (node_count, edge_count) = (graph.node_count(), graph.edge_count());

        let mut graphs = self.graphs.write();
        let prior = graphs.get(graph_id);
        let entry = GraphEntry {
            version,
            graph: Arc::new(graph),
            created_at: prior.map(|entry| entry.created_at).unwrap_or(now),
            last_updated_at: now,
            has_runtime_data: false,
            trace_count: prior.map(|entry| entry.trace_count).unwrap_or(0),
            revision: prior.map(|entry| entry.revision + 1).unwrap_or(0),
        };
        graphs.insert(graph_id.to_string(), entry);
        drop(graphs);

        info!(
            graph_id = %graph_id,
            nodes = node_count,
            edges = edge_count,
            "static graph stored"
        );
    }

    /// Current graph snapshot, or `None`.
    pub fn get(&self, graph_id: &str) -> Option<Arc<CoreGraph>> {
        self.graphs
            .read()
            .get(graph_id)
            .map(|entry| Arc::clone(&entry.graph))
    }

    /// Snapshot plus the revision it was read at, for optimistic merges.
    pub fn get_versioned(&self, graph_id: &str) -> Option<(Arc<CoreGraph>, u64)> {
        self.graphs
            .read()
            .get(graph_id)
            .map(|entry| (Arc::clone(&entry.graph), entry.revision))
    }

    pub fn exists(&self, graph_id: &str) -> bool {
        self.graphs.read().contains_key(graph_id)
    }

    /// Swap in a merged graph if the entry is still at `expected_revision`.
    pub fn update_merged(
        &self,
        graph_id: &str,
        expected_revision: u64,
        merged: CoreGraph,
    ) -> UpdateOutcome {
        let now = self.clock.now();
        let mut graphs = self.graphs.write();
        let Some(entry) = graphs.get_mut(graph_id) else {
            return UpdateOutcome::Missing;
        };
        if entry.revision != expected_revision {
            return UpdateOutcome::Conflict;
        }
        entry.graph = Arc::new(merged);
        entry.last_updated_at = now;
        entry.has_runtime_data = true;
        entry.revision += 1;
        drop(graphs);

        debug!(graph_id = %graph_id, "graph updated after merge");
        UpdateOutcome::Applied
    }

    /// Remove the graph. Idempotent; returns whether it was present. The
    /// caller is responsible for dropping the graph's traces from the buffer.
    pub fn delete(&self, graph_id: &str) -> bool {
        let removed = self.graphs.write().remove(graph_id).is_some();
        if removed {
            info!(graph_id = %graph_id, "graph deleted");
        }
        removed
    }

    pub fn increment_trace_count(&self, graph_id: &str) {
        if let Some(entry) = self.graphs.write().get_mut(graph_id) {
            entry.trace_count += 1;
        }
    }

    pub fn metadata(&self, graph_id: &str) -> Option<GraphMetadata> {
        self.graphs
            .read()
            .get(graph_id)
            .map(|entry| build_metadata(graph_id, entry))
    }

    /// Metadata for every stored graph, ordered by graph-id.
    pub fn list(&self) -> Vec<GraphMetadata> {
        let graphs = self.graphs.read();
        let mut listed: Vec<GraphMetadata> = graphs
            .iter()
            .map(|(graph_id, entry)| build_metadata(graph_id, entry))
            .collect();
        listed.sort_by(|a, b| a.graph_id.cmp(&b.graph_id));
        listed
    }

    pub fn count(&self) -> usize {
        self.graphs.read().len()
    }
}

fn build_metadata(graph_id: &str, entry: &GraphEntry) -> GraphMetadata {
    GraphMetadata {
        graph_id: graph_id.to_string(),
        version: entry.version.clone(),
        node_count: entry.graph.node_count(),
        edge_count: entry.graph.edge_count(),
        created_at: entry.created_at,
        last_updated_at: entry.last_updated_at,
        has_runtime_data: entry.has_runtime_data,
        trace_count: entry.trace_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use flowcore_engine::{CoreNode, NodeType};

    fn graph_with(nodes: &[&str]) -> CoreGraph {
        let mut graph = CoreGraph::new("1");
        for id in nodes {
            graph
                .add_node(CoreNode::new(*id, *id, NodeType::Method))
                .unwrap();
        }
        graph
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            DateTime::from_timestamp_millis(1_000).unwrap(),
        ))
    }

    #[test]
    fn replace_preserves_created_at_and_bumps_updated_at() {
        let clock = manual_clock();
        let store = GraphStore::new(clock.clone());

        store.put_static("g1", graph_with(&["a"]));
        let first = store.metadata("g1").unwrap();

        clock.advance(Duration::seconds(5));
        store.put_static("g1", graph_with(&["a", "b"]));
        let second = store.metadata("g1").unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_updated_at > first.last_updated_at);
        assert_eq!(second.node_count, 2);
        assert!(!second.has_runtime_data);
    }

    #[test]
    fn held_snapshot_outlives_a_replacement() {
        let store = GraphStore::new(manual_clock());
        store.put_static("g1", graph_with(&["a"]));
        let snapshot = store.get("g1").unwrap();

        store.put_static("g1", graph_with(&["a", "b"]));
        // The old snapshot is unchanged; a fresh get sees the new value.
        assert_eq!(snapshot.node_count(), 1);
        assert_eq!(store.get("g1").unwrap().node_count(), 2);
    }

    #[test]
    fn update_merged_applies_only_at_the_expected_revision() {
        let store = GraphStore::new(manual_clock());
        store.put_static("g1", graph_with(&["a"]));
        let (_, revision) = store.get_versioned("g1").unwrap();

        assert_eq!(
            store.update_merged("g1", revision, graph_with(&["a", "rt"])),
            UpdateOutcome::Applied
        );
        assert!(store.metadata("g1").unwrap().has_runtime_data);

        // Stale revision loses.
        assert_eq!(
            store.update_merged("g1", revision, graph_with(&["a"])),
            UpdateOutcome::Conflict
        );
        assert_eq!(
            store.update_merged("missing", 0, graph_with(&["a"])),
            UpdateOutcome::Missing
        );
    }

    #[test]
    fn delete_is_idempotent_and_list_never_shows_deleted_entries() {
        let store = GraphStore::new(manual_clock());
        store.put_static("g1", graph_with(&["a"]));
        store.put_static("g2", graph_with(&["b"]));

        assert!(store.delete("g1"));
        assert!(!store.delete("g1"));

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].graph_id, "g2");
        assert!(store.get("g1").is_none());
    }

    #[test]
    fn trace_counter_rides_along_in_metadata() {
        let store = GraphStore::new(manual_clock());
        store.put_static("g1", graph_with(&["a"]));
        store.increment_trace_count("g1");
        store.increment_trace_count("g1");
        assert_eq!(store.metadata("g1").unwrap().trace_count, 2);

        // Counter survives a static replacement.
        store.put_static("g1", graph_with(&["a", "b"]));
        assert_eq!(store.metadata("g1").unwrap().trace_count, 2);
    }
}
