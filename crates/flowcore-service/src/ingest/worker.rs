//! Worker pool draining the ingestion queue.
//!
//! Each worker is a tokio task looping on `dequeue` and dispatching on the
//! work-item variant. Failed items are logged and counted, never re-queued —
//! the submitter owns retry policy. On shutdown workers observe a stop flag,
//! drain whatever is still queued within a grace period, and exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::ingest::queue::IngestQueue;
use crate::ingest::work_item::WorkItem;
use crate::merge::MergeCoordinator;
use crate::metrics::IngestMetrics;
use crate::store::{GraphStore, TraceBuffer};

/// Everything a worker needs, cloned into each task.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<IngestQueue>,
    pub graph_store: Arc<GraphStore>,
    pub trace_buffer: Arc<TraceBuffer>,
    pub merger: Arc<MergeCoordinator>,
    pub metrics: Arc<IngestMetrics>,
    pub poll_timeout: std::time::Duration,
    pub shutdown_grace: std::time::Duration,
}

pub struct WorkerPool {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. Zero workers is allowed (nothing drains the
    /// queue — useful for backpressure tests).
    pub fn start(count: usize, ctx: WorkerContext) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let handles = (0..count)
            .map(|worker_index| {
                let running = Arc::clone(&running);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    process_loop(worker_index, running, ctx).await;
                })
            })
            .collect();
        info!(workers = count, "ingestion workers started");
        Self { running, handles }
    }

    /// Stop the pool. Workers finish their drain phase; any worker still
    /// running past the grace period is aborted.
    pub async fn shutdown(self, grace: std::time::Duration) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("worker did not stop within the grace period");
            }
        }
        info!("ingestion workers stopped");
    }
}

async fn process_loop(worker_index: usize, running: Arc<AtomicBool>, ctx: WorkerContext) {
    debug!(worker_index, "worker loop started");
    while running.load(Ordering::SeqCst) {
        if let Some(item) = ctx.queue.dequeue(ctx.poll_timeout).await {
            process_item(&ctx, item).await;
        }
    }

    // Drain what is already queued, bounded by the grace period.
    let deadline = Instant::now() + ctx.shutdown_grace;
    while Instant::now() < deadline {
        match ctx.queue.dequeue(std::time::Duration::ZERO).await {
            Some(item) => process_item(&ctx, item).await,
            None => break,
        }
    }
    debug!(worker_index, "worker loop stopped");
}

async fn process_item(ctx: &WorkerContext, item: WorkItem) {
    match item {
        WorkItem::StaticGraph {
            graph_id, payload, ..
        } => handle_static_graph(ctx, &graph_id, &payload),
        WorkItem::RuntimeEvents {
            trace_id,
            graph_id,
            events,
            trace_complete,
            ..
        } => handle_runtime_events(ctx, &trace_id, &graph_id, &events, trace_complete),
    }
}

/// The loader runs here, off the ingress thread.
fn handle_static_graph(ctx: &WorkerContext, graph_id: &str, payload: &flowcore_engine::GraphPayload) {
    match flowcore_engine::load(payload) {
        Ok(graph) => {
            ctx.graph_store.put_static(graph_id, graph);
            ctx.metrics.record_static_graph_ingested();
        }
        Err(err) => {
            error!(graph_id = %graph_id, "static graph ingestion failed: {err}");
        }
    }
}

fn handle_runtime_events(
    ctx: &WorkerContext,
    trace_id: &str,
    graph_id: &str,
    events: &[flowcore_engine::RuntimeEvent],
    trace_complete: bool,
) {
    // The graph may have been deleted since ingress admitted the batch.
    if !ctx.graph_store.exists(graph_id) {
        warn!(
            trace_id = %trace_id,
            graph_id = %graph_id,
            code = "GRAPH_NOT_FOUND",
            "dropping runtime events for unknown graph"
        );
        return;
    }

    let outcome = ctx.trace_buffer.append(trace_id, graph_id, events);
    ctx.metrics
        .record_runtime_events_ingested(outcome.appended as u64);
    if outcome.created_trace {
        ctx.graph_store.increment_trace_count(graph_id);
    }

    if trace_complete {
        debug!(trace_id = %trace_id, "trace complete, scheduling merge");
        ctx.trace_buffer.mark_complete(trace_id);
        // The merge runs on its own task so the worker returns to the queue
        // immediately.
        let merger = Arc::clone(&ctx.merger);
        let trace_id = trace_id.to_string();
        let graph_id = graph_id.to_string();
        tokio::spawn(async move {
            merger.run_scheduled_merge(&trace_id, &graph_id);
        });
    }
}
