//! Flow graph engine — the value-level core of the Flow pipeline.
//!
//! This crate holds everything that operates on plain in-memory values with
//! no I/O and no concurrency: the typed graph model, the static payload
//! loader, the deterministic trace merge engine, the structural validator,
//! the flow extractor, and the Cypher exporter. The hosting service wires
//! these into its stores and workers.

pub mod errors;
pub mod export;
pub mod flow;
pub mod graph;
pub mod loader;
pub mod merge;
pub mod runtime;
pub mod types;
pub mod validate;

pub use errors::EngineError;
pub use export::CypherExporter;
pub use flow::{FlowExtractor, FlowModel, FlowStep};
pub use graph::{CoreEdge, CoreGraph, CoreNode};
pub use loader::{load, validate_payload, EdgePayload, GraphPayload, NodePayload};
pub use merge::MergeEngine;
pub use runtime::{EventBatchPayload, EventPayload, RuntimeEvent};
pub use types::{EdgeType, EventType, NodeType, Visibility, ZoomLevel};
pub use validate::validate_graph;
