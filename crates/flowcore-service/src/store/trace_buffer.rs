//! Keyed buffer of accumulating runtime traces.
//!
//! Each trace is guarded by its own lock; the outer map lock is held only
//! for lookup and membership changes, so appends to distinct traces proceed
//! in parallel. Derived projections (checkpoints, errors, async hops) are
//! filled while events are appended, in submission order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flowcore_engine::{EventType, RuntimeEvent};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::TraceRetentionConfig;
use crate::metrics::IngestMetrics;
use crate::store::dedup::EventDeduplicator;

/// A checkpoint observed within a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceCheckpoint {
    pub checkpoint_id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub attributes: BTreeMap<String, Value>,
}

/// An error observed within a trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceError {
    pub error_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// A matched produce/consume pair sharing a correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncHop {
    pub correlation_id: String,
    pub producer_node_id: String,
    pub consumer_node_id: String,
    pub produced_at: DateTime<Utc>,
    pub consumed_at: DateTime<Utc>,
}

/// Immutable deep copy of a trace, handed to readers and the merge engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSnapshot {
    pub trace_id: String,
    pub graph_id: String,
    pub events: Vec<RuntimeEvent>,
    pub checkpoints: Vec<TraceCheckpoint>,
    pub errors: Vec<TraceError>,
    pub async_hops: Vec<AsyncHop>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub complete: bool,
    pub merged: bool,
    pub has_errors: bool,
}

/// What an append did: traces created, events kept, events dropped as
/// duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub created_trace: bool,
    pub appended: usize,
    pub deduplicated: usize,
}

struct MutableTrace {
    trace_id: String,
    graph_id: String,
    events: Vec<RuntimeEvent>,
    checkpoints: Vec<TraceCheckpoint>,
    errors: Vec<TraceError>,
    async_hops: Vec<AsyncHop>,
    /// Unconsumed PRODUCE_TOPIC events, keyed by correlation id.
    pending_produces: BTreeMap<String, Vec<(String, DateTime<Utc>)>>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    complete: bool,
    merged: bool,
}

impl MutableTrace {
    fn snapshot(&self) -> TraceSnapshot {
        TraceSnapshot {
            trace_id: self.trace_id.clone(),
            graph_id: self.graph_id.clone(),
            events: self.events.clone(),
            checkpoints: self.checkpoints.clone(),
            errors: self.errors.clone(),
            async_hops: self.async_hops.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
            complete: self.complete,
            merged: self.merged,
            has_errors: !self.errors.is_empty(),
        }
    }
}

struct BufferInner {
    traces: HashMap<String, Arc<Mutex<MutableTrace>>>,
    by_graph: HashMap<String, BTreeSet<String>>,
}

pub struct TraceBuffer {
    clock: Arc<dyn Clock>,
    dedup: Arc<EventDeduplicator>,
    retention: TraceRetentionConfig,
    metrics: Arc<IngestMetrics>,
    inner: RwLock<BufferInner>,
}

impl TraceBuffer {
    pub fn new(
        clock: Arc<dyn Clock>,
        dedup: Arc<EventDeduplicator>,
        retention: TraceRetentionConfig,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            clock,
            dedup,
            retention,
            metrics,
            inner: RwLock::new(BufferInner {
                traces: HashMap::new(),
                by_graph: HashMap::new(),
            }),
        }
    }

    /// Append a batch of events, creating the trace on first sight.
    /// Duplicate events (per dedup key) are dropped and counted.
    pub fn append(
        &self,
        trace_id: &str,
        graph_id: &str,
        events: &[RuntimeEvent],
    ) -> AppendOutcome {
        let mut outcome = AppendOutcome::default();
        let trace = {
            let mut inner = self.inner.write();
            match inner.traces.get(trace_id) {
                Some(existing) => Arc::clone(existing),
                None => {
                    outcome.created_trace = true;
                    let created = Arc::new(Mutex::new(MutableTrace {
                        trace_id: trace_id.to_string(),
                        graph_id: graph_id.to_string(),
                        events: Vec::new(),
                        checkpoints: Vec::new(),
                        errors: Vec::new(),
                        async_hops: Vec::new(),
                        pending_produces: BTreeMap::new(),
                        created_at: self.clock.now(),
                        completed_at: None,
                        complete: false,
                        merged: false,
                    }));
                    inner
                        .traces
                        .insert(trace_id.to_string(), Arc::clone(&created));
                    inner
                        .by_graph
                        .entry(graph_id.to_string())
                        .or_default()
                        .insert(trace_id.to_string());
                    created
                }
            }
        };

        let mut trace = trace.lock();
        for event in events {
            if self.dedup.is_duplicate(trace_id, &event.dedup_key()) {
                outcome.deduplicated += 1;
                self.metrics.record_deduplicated_event();
                debug!(trace_id = %trace_id, "duplicate event skipped");
                continue;
            }
            project_event(&mut trace, event);
            trace.events.push(event.clone());
            outcome.appended += 1;
        }
        outcome
    }

    /// Idempotent; `completed_at` is set on the first call only.
    pub fn mark_complete(&self, trace_id: &str) {
        if let Some(trace) = self.trace(trace_id) {
            let mut trace = trace.lock();
            if !trace.complete {
                trace.complete = true;
                trace.completed_at = Some(self.clock.now());
                debug!(trace_id = %trace_id, "trace marked complete");
            }
        }
    }

    /// Idempotent.
    pub fn mark_merged(&self, trace_id: &str) {
        if let Some(trace) = self.trace(trace_id) {
            trace.lock().merged = true;
        }
    }

    pub fn get(&self, trace_id: &str) -> Option<TraceSnapshot> {
        self.trace(trace_id).map(|trace| trace.lock().snapshot())
    }

    /// Snapshots of traces that are complete but not yet merged, oldest
    /// first.
    pub fn pending_for_graph(&self, graph_id: &str) -> Vec<TraceSnapshot> {
        let traces = {
            let inner = self.inner.read();
            let Some(trace_ids) = inner.by_graph.get(graph_id) else {
                return Vec::new();
            };
            trace_ids
                .iter()
                .filter_map(|trace_id| inner.traces.get(trace_id).map(Arc::clone))
                .collect::<Vec<_>>()
        };
        let mut pending: Vec<TraceSnapshot> = traces
            .iter()
            .map(|trace| trace.lock().snapshot())
            .filter(|snapshot| snapshot.complete && !snapshot.merged)
            .collect();
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        pending
    }

    /// Idempotent; returns whether the trace was present.
    pub fn delete(&self, trace_id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(trace) = inner.traces.remove(trace_id) else {
            return false;
        };
        let graph_id = trace.lock().graph_id.clone();
        if let Some(trace_ids) = inner.by_graph.get_mut(&graph_id) {
            trace_ids.remove(trace_id);
            if trace_ids.is_empty() {
                inner.by_graph.remove(&graph_id);
            }
        }
        drop(inner);
        self.dedup.clear_trace(trace_id);
        debug!(trace_id = %trace_id, "trace deleted");
        true
    }

    /// Drop every trace associated with the graph. Idempotent.
    pub fn delete_for_graph(&self, graph_id: &str) -> usize {
        let trace_ids = {
            let mut inner = self.inner.write();
            let Some(trace_ids) = inner.by_graph.remove(graph_id) else {
                return 0;
            };
            for trace_id in &trace_ids {
                inner.traces.remove(trace_id);
            }
            trace_ids
        };
        for trace_id in &trace_ids {
            self.dedup.clear_trace(trace_id);
        }
        info!(
            graph_id = %graph_id,
            deleted = trace_ids.len(),
            "traces deleted for graph"
        );
        trace_ids.len()
    }

    pub fn count(&self) -> usize {
        self.inner.read().traces.len()
    }

    /// One eviction sweep: merged traces past their TTL, unmerged traces
    /// past the hard bound, then oldest-first overflow beyond `max_count`.
    /// Returns how many traces were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl_ms = self.retention.ttl.as_millis() as i64;
        let hard_ttl_ms = self.retention.hard_ttl.as_millis() as i64;

        let candidates: Vec<(String, Arc<Mutex<MutableTrace>>)> = {
            let inner = self.inner.read();
            inner
                .traces
                .iter()
                .map(|(trace_id, trace)| (trace_id.clone(), Arc::clone(trace)))
                .collect()
        };

        let mut expired = Vec::new();
        let mut survivors: Vec<(String, DateTime<Utc>)> = Vec::new();
        for (trace_id, trace) in candidates {
            let trace = trace.lock();
            let past_ttl = trace
                .completed_at
                .map(|completed_at| (now - completed_at).num_milliseconds() > ttl_ms)
                .unwrap_or(false);
            if trace.merged && trace.complete && past_ttl {
                expired.push(trace_id);
                continue;
            }
            if !trace.merged && (now - trace.created_at).num_milliseconds() > hard_ttl_ms {
                warn!(
                    trace_id = %trace_id,
                    graph_id = %trace.graph_id,
                    "unmerged trace past hard bound, forcibly evicting"
                );
                expired.push(trace_id);
                continue;
            }
            survivors.push((trace_id, trace.created_at));
        }

        // Overflow: oldest created_at evicted first.
        if survivors.len() > self.retention.max_count {
            survivors.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            let overflow = survivors.len() - self.retention.max_count;
            expired.extend(survivors.drain(..overflow).map(|(trace_id, _)| trace_id));
        }

        let mut evicted = 0;
        for trace_id in expired {
            if self.delete(&trace_id) {
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.metrics.record_traces_evicted(evicted as u64);
            info!(evicted, "expired traces evicted");
        }
        evicted
    }

    fn trace(&self, trace_id: &str) -> Option<Arc<Mutex<MutableTrace>>> {
        self.inner.read().traces.get(trace_id).map(Arc::clone)
    }
}

/// Maintain the derived projections for one accepted event.
fn project_event(trace: &mut MutableTrace, event: &RuntimeEvent) {
    match event.event_type {
        EventType::Checkpoint => {
            let name = event
                .attributes
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string();
            trace.checkpoints.push(TraceCheckpoint {
                checkpoint_id: Uuid::new_v4().to_string(),
                name,
                timestamp: event.timestamp,
                node_id: event.node_id.clone(),
                attributes: event.attributes.clone(),
            });
        }
        EventType::Error => {
            trace.errors.push(TraceError {
                error_id: Uuid::new_v4().to_string(),
                error_type: event.error_type.clone(),
                message: event.error_message.clone(),
                timestamp: event.timestamp,
                node_id: event.node_id.clone(),
                span_id: event.span_id.clone(),
            });
        }
        EventType::ProduceTopic => {
            if let Some(correlation) = event.correlation() {
                trace
                    .pending_produces
                    .entry(correlation.to_string())
                    .or_default()
                    .push((event.node_id.clone(), event.timestamp));
            }
        }
        EventType::ConsumeTopic => {
            let Some(correlation) = event.correlation().map(str::to_string) else {
                return;
            };
            let matched = trace
                .pending_produces
                .get_mut(&correlation)
                .filter(|produces| !produces.is_empty())
                .map(|produces| produces.remove(0));
            if let Some((producer_node_id, produced_at)) = matched {
                trace.async_hops.push(AsyncHop {
                    correlation_id: correlation,
                    producer_node_id,
                    consumer_node_id: event.node_id.clone(),
                    produced_at,
                    consumed_at: event.timestamp,
                });
            }
        }
        EventType::MethodEnter | EventType::MethodExit => {}
    }
}
