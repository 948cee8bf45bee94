//! Error types for the engine's value-level operations.

use thiserror::Error;

/// Errors raised by graph construction, payload decoding, and validation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("duplicate node id: {id}")]
    DuplicateNode { id: String },

    #[error("duplicate edge id: {id}")]
    DuplicateEdge { id: String },

    #[error("edge {edge_id} references missing node: {node_id}")]
    InvalidReference { edge_id: String, node_id: String },

    #[error("unknown {field}: {value}")]
    InvalidEnum { field: &'static str, value: String },

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}
