//! The Flow Core composition root and handler API.
//!
//! `FlowCoreService` owns every component and exposes the operations the
//! surrounding transport maps to HTTP: submissions go through the bounded
//! queue to the worker pool; reads are served from store snapshots. Each
//! component is a plain value wired here at construction — tests construct
//! the service directly with a manual clock or a mock analytics writer.

use std::sync::Arc;
use std::time::Duration;

use flowcore_engine::{
    validate_payload, CoreGraph, CypherExporter, EventBatchPayload, FlowExtractor, FlowModel,
    FlowStep, GraphPayload, RuntimeEvent,
};
use parking_lot::Mutex;
use tracing::info;

use crate::analytics::{AnalyticsExporter, AnalyticsWriter, DisconnectedWriter, ExportOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::FlowCoreConfig;
use crate::errors::CoreError;
use crate::ingest::{IngestQueue, WorkItem, WorkerContext, WorkerPool};
use crate::merge::MergeCoordinator;
use crate::metrics::{HealthReport, IngestMetrics, MetricsSnapshot};
use crate::retention::RetentionHandle;
use crate::store::{EventDeduplicator, GraphMetadata, GraphStore, TraceBuffer, TraceSnapshot};

/// Fluent construction for [`FlowCoreService`].
pub struct FlowCoreServiceBuilder {
    config: FlowCoreConfig,
    clock: Option<Arc<dyn Clock>>,
    analytics_writer: Option<Arc<dyn AnalyticsWriter>>,
}

impl FlowCoreServiceBuilder {
    pub fn config(mut self, config: FlowCoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn analytics_writer(mut self, writer: Arc<dyn AnalyticsWriter>) -> Self {
        self.analytics_writer = Some(writer);
        self
    }

    /// Wire everything and start the workers and the eviction ticker.
    /// Must be called within a tokio runtime.
    pub fn start(self) -> FlowCoreService {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = Arc::new(IngestMetrics::new());
        let dedup = Arc::new(EventDeduplicator::new(config.features.dedup_enabled));
        let graph_store = Arc::new(GraphStore::new(clock.clone()));
        let trace_buffer = Arc::new(TraceBuffer::new(
            clock.clone(),
            dedup,
            config.trace.clone(),
            metrics.clone(),
        ));
        let merger = Arc::new(MergeCoordinator::new(
            graph_store.clone(),
            trace_buffer.clone(),
            metrics.clone(),
            config.features.strict_validation,
        ));
        let queue = Arc::new(IngestQueue::new(config.queue.capacity));

        let workers = WorkerPool::start(
            config.worker.count,
            WorkerContext {
                queue: queue.clone(),
                graph_store: graph_store.clone(),
                trace_buffer: trace_buffer.clone(),
                merger: merger.clone(),
                metrics: metrics.clone(),
                poll_timeout: config.worker.poll_timeout,
                shutdown_grace: config.worker.shutdown_grace,
            },
        );
        let retention = RetentionHandle::spawn(trace_buffer.clone(), config.trace.eviction_interval);

        let analytics = AnalyticsExporter::new(
            self.analytics_writer
                .unwrap_or_else(|| Arc::new(DisconnectedWriter)),
            config.export.push_timeout,
            metrics.clone(),
        );

        info!(
            queue_capacity = config.queue.capacity,
            workers = config.worker.count,
            "flow core service started"
        );
        FlowCoreService {
            config,
            clock,
            metrics,
            queue,
            graph_store,
            trace_buffer,
            merger,
            extractor: FlowExtractor::new(),
            cypher: CypherExporter::new(),
            analytics,
            workers: Mutex::new(Some(workers)),
            retention: Mutex::new(Some(retention)),
        }
    }
}

pub struct FlowCoreService {
    config: FlowCoreConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<IngestMetrics>,
    queue: Arc<IngestQueue>,
    graph_store: Arc<GraphStore>,
    trace_buffer: Arc<TraceBuffer>,
    merger: Arc<MergeCoordinator>,
    extractor: FlowExtractor,
    cypher: CypherExporter,
    analytics: AnalyticsExporter,
    workers: Mutex<Option<WorkerPool>>,
    retention: Mutex<Option<RetentionHandle>>,
}

impl FlowCoreService {
    pub fn builder() -> FlowCoreServiceBuilder {
        FlowCoreServiceBuilder {
            config: FlowCoreConfig::default(),
            clock: None,
            analytics_writer: None,
        }
    }

    // -- submissions --

    /// Accept a static graph for deferred loading. The payload is validated
    /// here so the submitter learns about bad enums synchronously; the
    /// loader itself runs on a worker.
    pub async fn submit_static(&self, payload: GraphPayload) -> Result<(), CoreError> {
        validate_payload(&payload)?;
        let item = WorkItem::StaticGraph {
            graph_id: payload.graph_id.clone(),
            payload,
            created_at: self.clock.now(),
        };
        self.enqueue(item).await
    }

    /// Accept a runtime event batch. The graph must already exist; events
    /// with unknown types fail validation before anything is queued.
    pub async fn submit_runtime(&self, batch: EventBatchPayload) -> Result<(), CoreError> {
        if !self.graph_store.exists(&batch.graph_id) {
            return Err(CoreError::GraphNotFound {
                graph_id: batch.graph_id,
            });
        }
        let events = batch
            .events
            .iter()
            .map(RuntimeEvent::from_payload)
            .collect::<Result<Vec<_>, _>>()?;
        let item = WorkItem::RuntimeEvents {
            trace_id: batch.trace_id,
            graph_id: batch.graph_id,
            events,
            trace_complete: batch.trace_complete,
            created_at: self.clock.now(),
        };
        self.enqueue(item).await
    }

    async fn enqueue(&self, item: WorkItem) -> Result<(), CoreError> {
        if self
            .queue
            .enqueue(item, self.config.queue.enqueue_timeout)
            .await
        {
            Ok(())
        } else {
            self.metrics.record_enqueue_rejection();
            Err(CoreError::QueueFull)
        }
    }

    // -- graph reads --

    pub fn get_graph(&self, graph_id: &str) -> Result<Arc<CoreGraph>, CoreError> {
        self.graph_store
            .get(graph_id)
            .ok_or_else(|| CoreError::GraphNotFound {
                graph_id: graph_id.to_string(),
            })
    }

    pub fn get_graph_metadata(&self, graph_id: &str) -> Result<GraphMetadata, CoreError> {
        self.graph_store
            .metadata(graph_id)
            .ok_or_else(|| CoreError::GraphNotFound {
                graph_id: graph_id.to_string(),
            })
    }

    pub fn list_graphs(&self) -> Vec<GraphMetadata> {
        self.graph_store.list()
    }

    /// Remove the graph and every trace associated with it. Idempotent;
    /// returns whether the graph was present.
    pub fn delete_graph(&self, graph_id: &str) -> bool {
        let removed = self.graph_store.delete(graph_id);
        self.trace_buffer.delete_for_graph(graph_id);
        removed
    }

    // -- extraction --

    /// Subgraph at the requested zoom (0 = highest level).
    pub fn slice(&self, graph_id: &str, zoom_level: u8) -> Result<CoreGraph, CoreError> {
        let graph = self.get_graph(graph_id)?;
        Ok(self.extractor.slice(&graph, zoom_level))
    }

    /// BFS flows from every endpoint and topic node.
    pub fn extract_flows(&self, graph_id: &str) -> Result<Vec<FlowModel>, CoreError> {
        let graph = self.get_graph(graph_id)?;
        Ok(self.extractor.extract_flows(&graph))
    }

    pub fn extract_flow(&self, graph_id: &str, start_node_id: &str) -> Result<FlowModel, CoreError> {
        let graph = self.get_graph(graph_id)?;
        self.extractor
            .extract_flow(&graph, start_node_id)
            .ok_or_else(|| CoreError::Validation {
                message: format!("start node not found: {start_node_id}"),
            })
    }

    pub fn extract_path(
        &self,
        graph_id: &str,
        from_node_id: &str,
        to_node_id: &str,
    ) -> Result<Vec<FlowStep>, CoreError> {
        let graph = self.get_graph(graph_id)?;
        self.extractor
            .extract_path(&graph, from_node_id, to_node_id)
            .ok_or_else(|| CoreError::Validation {
                message: format!("start node not found: {from_node_id}"),
            })
    }

    // -- traces --

    pub fn get_trace(&self, trace_id: &str) -> Result<TraceSnapshot, CoreError> {
        self.trace_buffer
            .get(trace_id)
            .ok_or_else(|| CoreError::TraceNotFound {
                trace_id: trace_id.to_string(),
            })
    }

    pub fn trace_count(&self) -> usize {
        self.trace_buffer.count()
    }

    /// Re-run merges for every complete-but-unmerged trace of a graph.
    pub fn merge_pending(&self, graph_id: &str) -> usize {
        self.merger.merge_pending(graph_id)
    }

    /// One manual eviction sweep (the periodic ticker does this on its own).
    pub fn evict_expired_traces(&self) -> usize {
        self.trace_buffer.evict_expired()
    }

    // -- export --

    pub fn export_cypher(&self, graph_id: &str) -> Result<Vec<String>, CoreError> {
        let graph = self.get_graph(graph_id)?;
        Ok(self.cypher.export(graph_id, &graph))
    }

    pub async fn push_to_analytics(&self, graph_id: &str) -> Result<ExportOutcome, CoreError> {
        let graph = self.get_graph(graph_id)?;
        let statements = self.cypher.export(graph_id, &graph);
        self.analytics
            .push(graph_id, statements, graph.node_count(), graph.edge_count())
            .await
            .map_err(|err| CoreError::Unavailable {
                message: err.to_string(),
            })
    }

    // -- observability --

    pub fn health(&self) -> HealthReport {
        HealthReport::from_utilization(
            self.queue.size(),
            self.queue.capacity(),
            self.queue.utilization_percent(),
            self.config.queue.backpressure_threshold,
        )
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Discard everything still queued. Admin escape hatch.
    pub async fn clear_queue(&self) -> usize {
        self.queue.clear().await
    }

    // -- lifecycle --

    /// Stop the workers (draining the queue within the grace period) and
    /// the eviction ticker. Idempotent.
    pub async fn shutdown(&self) {
        let workers = self.workers.lock().take();
        if let Some(workers) = workers {
            workers
                .shutdown(self.config.worker.shutdown_grace + Duration::from_secs(1))
                .await;
        }
        let retention = self.retention.lock().take();
        if let Some(retention) = retention {
            retention.shutdown().await;
        }
        info!("flow core service stopped");
    }
}
