//! The tagged sum of work flowing through the ingestion queue.

use chrono::{DateTime, Utc};
use flowcore_engine::{GraphPayload, RuntimeEvent};

/// One unit of deferred ingestion work. Handlers dispatch on the variant
/// with an exhaustive match — adding a variant must break every dispatcher.
#[derive(Debug, Clone)]
pub enum WorkItem {
    StaticGraph {
        graph_id: String,
        payload: GraphPayload,
        created_at: DateTime<Utc>,
    },
    RuntimeEvents {
        trace_id: String,
        graph_id: String,
        events: Vec<RuntimeEvent>,
        trace_complete: bool,
        created_at: DateTime<Utc>,
    },
}

impl WorkItem {
    /// The id used in logs and error context: graph-id for static work,
    /// trace-id for runtime work.
    pub fn entity_id(&self) -> &str {
        match self {
            WorkItem::StaticGraph { graph_id, .. } => graph_id,
            WorkItem::RuntimeEvents { trace_id, .. } => trace_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            WorkItem::StaticGraph { created_at, .. }
            | WorkItem::RuntimeEvents { created_at, .. } => *created_at,
        }
    }
}
