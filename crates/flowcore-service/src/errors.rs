//! The error taxonomy surfaced to callers of the handler API.
//!
//! Every variant carries a stable identifier via [`CoreError::code`]; the
//! surrounding transport maps those to status codes. Messages stay short —
//! internal detail is logged, never propagated to submitters.

use flowcore_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("graph not found: {graph_id}")]
    GraphNotFound { graph_id: String },

    #[error("trace not found: {trace_id}")]
    TraceNotFound { trace_id: String },

    #[error("ingestion queue full")]
    QueueFull,

    #[error("invalid reference: {message}")]
    InvalidReference { message: String },

    #[error("merge conflict on graph {graph_id} after {attempts} attempts")]
    MergeConflict { graph_id: String, attempts: u32 },

    #[error("merge produced an invalid graph: {message}")]
    MergeInvalid { message: String },

    #[error("analytics store unavailable: {message}")]
    Unavailable { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Stable identifier for the transport layer's status mapping.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "VALIDATION_ERROR",
            CoreError::GraphNotFound { .. } => "GRAPH_NOT_FOUND",
            CoreError::TraceNotFound { .. } => "TRACE_NOT_FOUND",
            CoreError::QueueFull => "QUEUE_FULL",
            CoreError::InvalidReference { .. } => "INVALID_REFERENCE",
            CoreError::MergeConflict { .. } => "MERGE_CONFLICT",
            CoreError::MergeInvalid { .. } => "MERGE_INVALID",
            CoreError::Unavailable { .. } => "UNAVAILABLE",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidReference { edge_id, node_id } => CoreError::InvalidReference {
                message: format!("edge {edge_id} references missing node {node_id}"),
            },
            other @ (EngineError::DuplicateNode { .. }
            | EngineError::DuplicateEdge { .. }
            | EngineError::InvalidEnum { .. }
            | EngineError::MissingField { .. }) => CoreError::Validation {
                message: other.to_string(),
            },
        }
    }
}
