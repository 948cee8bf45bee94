//! Coordinates trace merges against the graph store.
//!
//! A merge reads a graph snapshot and a trace snapshot, runs the engine's
//! pure transformation, validates the result, and attempts an optimistic
//! swap. When another writer replaced the graph in the meantime the merge
//! re-runs on the newer snapshot, up to a small fixed number of attempts;
//! exhaustion surfaces MERGE_CONFLICT and leaves the trace pending so a
//! later submission or admin action can retry it.

use std::sync::Arc;

use flowcore_engine::{validate_graph, MergeEngine};
use tracing::{debug, error, info, warn};

use crate::errors::CoreError;
use crate::metrics::IngestMetrics;
use crate::store::{GraphStore, TraceBuffer, UpdateOutcome};

const MAX_MERGE_ATTEMPTS: u32 = 3;

pub struct MergeCoordinator {
    graph_store: Arc<GraphStore>,
    trace_buffer: Arc<TraceBuffer>,
    engine: MergeEngine,
    metrics: Arc<IngestMetrics>,
    strict_validation: bool,
}

impl MergeCoordinator {
    pub fn new(
        graph_store: Arc<GraphStore>,
        trace_buffer: Arc<TraceBuffer>,
        metrics: Arc<IngestMetrics>,
        strict_validation: bool,
    ) -> Self {
        Self {
            graph_store,
            trace_buffer,
            engine: MergeEngine::new(),
            metrics,
            strict_validation,
        }
    }

    /// Merge one trace into its graph. On success the trace is marked
    /// merged; the trace stays in the buffer either way.
    pub fn merge_trace(&self, trace_id: &str, graph_id: &str) -> Result<(), CoreError> {
        let trace = self
            .trace_buffer
            .get(trace_id)
            .ok_or_else(|| CoreError::TraceNotFound {
                trace_id: trace_id.to_string(),
            })?;

        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            let (graph, revision) = self.graph_store.get_versioned(graph_id).ok_or_else(|| {
                CoreError::GraphNotFound {
                    graph_id: graph_id.to_string(),
                }
            })?;

            let merged = self
                .engine
                .merge(&graph, trace_id, &trace.events)
                .map_err(|err| {
                    self.metrics.record_merge_failed();
                    CoreError::Internal {
                        message: err.to_string(),
                    }
                })?;

            if let Err(violations) = validate_graph(&merged, self.strict_validation) {
                self.metrics.record_merge_failed();
                return Err(CoreError::MergeInvalid {
                    message: violations.join("; "),
                });
            }

            match self.graph_store.update_merged(graph_id, revision, merged) {
                UpdateOutcome::Applied => {
                    self.trace_buffer.mark_merged(trace_id);
                    self.metrics.record_merge_completed();
                    info!(trace_id = %trace_id, graph_id = %graph_id, "merge completed");
                    return Ok(());
                }
                UpdateOutcome::Missing => {
                    return Err(CoreError::GraphNotFound {
                        graph_id: graph_id.to_string(),
                    });
                }
                UpdateOutcome::Conflict => {
                    debug!(
                        trace_id = %trace_id,
                        graph_id = %graph_id,
                        attempt,
                        "merge raced a concurrent update, retrying on the newer snapshot"
                    );
                }
            }
        }

        self.metrics.record_merge_failed();
        Err(CoreError::MergeConflict {
            graph_id: graph_id.to_string(),
            attempts: MAX_MERGE_ATTEMPTS,
        })
    }

    /// Entry point for merges scheduled off the worker pool. A conflicted
    /// merge is rescheduled once, then dropped; other failures are dropped
    /// immediately. All outcomes are logged with entity context.
    pub fn run_scheduled_merge(&self, trace_id: &str, graph_id: &str) {
        match self.merge_trace(trace_id, graph_id) {
            Ok(()) => {}
            Err(CoreError::MergeConflict { .. }) => {
                warn!(trace_id = %trace_id, graph_id = %graph_id, "merge conflicted, rescheduling once");
                if let Err(err) = self.merge_trace(trace_id, graph_id) {
                    error!(
                        trace_id = %trace_id,
                        graph_id = %graph_id,
                        code = err.code(),
                        "rescheduled merge failed, dropping: {err}"
                    );
                }
            }
            Err(err) => {
                error!(
                    trace_id = %trace_id,
                    graph_id = %graph_id,
                    code = err.code(),
                    "merge failed: {err}"
                );
            }
        }
    }

    /// Batch-merge every complete-but-unmerged trace for a graph. Returns
    /// how many merged.
    pub fn merge_pending(&self, graph_id: &str) -> usize {
        let pending = self.trace_buffer.pending_for_graph(graph_id);
        let mut merged = 0;
        for trace in &pending {
            match self.merge_trace(&trace.trace_id, graph_id) {
                Ok(()) => merged += 1,
                Err(err) => {
                    error!(
                        trace_id = %trace.trace_id,
                        graph_id = %graph_id,
                        code = err.code(),
                        "pending merge failed: {err}"
                    );
                }
            }
        }
        info!(graph_id = %graph_id, merged, "batch merge completed");
        merged
    }
}
