//! Flow Core — an in-process telemetry pipeline correlating static
//! application structure graphs with runtime execution traces.
//!
//! Three collaborators meet here: a build-time adapter uploads graph
//! definitions, a runtime plugin emits per-trace event batches, and a
//! UI/analytics layer reads merged graphs, zoom slices, and trace
//! timelines. Submissions flow through a bounded queue into a worker pool;
//! completed traces are folded into their graphs by the deterministic merge
//! engine from `flowcore-engine`.
//!
//! The service holds no persistent state: the process starts empty and all
//! state is lost on shutdown. Construct via [`FlowCoreService::builder`].

pub mod analytics;
pub mod clock;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod retention;
pub mod service;
pub mod store;

pub use analytics::{AnalyticsError, AnalyticsWriter, DisconnectedWriter, ExportOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ExportConfig, FeatureFlags, FlowCoreConfig, QueueConfig, TraceRetentionConfig, WorkerConfig,
};
pub use errors::CoreError;
pub use ingest::{IngestQueue, WorkItem, WorkerPool};
pub use merge::MergeCoordinator;
pub use metrics::{HealthReport, HealthStatus, IngestMetrics, MetricsSnapshot};
pub use retention::RetentionHandle;
pub use service::{FlowCoreService, FlowCoreServiceBuilder};
pub use store::{
    AppendOutcome, AsyncHop, EventDeduplicator, GraphMetadata, GraphStore, TraceBuffer,
    TraceCheckpoint, TraceError, TraceSnapshot,
};

// Re-export the engine's value types so embedders need a single dependency.
pub use flowcore_engine::{
    CoreEdge, CoreGraph, CoreNode, CypherExporter, EdgeType, EventBatchPayload, EventPayload,
    EventType, FlowExtractor, FlowModel, FlowStep, GraphPayload, MergeEngine, NodeType,
    RuntimeEvent, Visibility, ZoomLevel,
};
