//! Explicit counters, incremented at enumerated call sites.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Pipeline counters. Cheap to share (`Arc`), cheap to bump (relaxed atomics).
#[derive(Debug, Default)]
pub struct IngestMetrics {
    static_graphs_ingested: AtomicU64,
    runtime_events_ingested: AtomicU64,
    deduplicated_events: AtomicU64,
    enqueue_rejections: AtomicU64,
    merges_completed: AtomicU64,
    merges_failed: AtomicU64,
    exports_completed: AtomicU64,
    exports_failed: AtomicU64,
    traces_evicted: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_static_graph_ingested(&self) {
        self.static_graphs_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_runtime_events_ingested(&self, count: u64) {
        self.runtime_events_ingested
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_deduplicated_event(&self) {
        self.deduplicated_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueue_rejection(&self) {
        self.enqueue_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_completed(&self) {
        self.merges_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_failed(&self) {
        self.merges_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export_completed(&self) {
        self.exports_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export_failed(&self) {
        self.exports_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_traces_evicted(&self, count: u64) {
        self.traces_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn deduplicated_events(&self) -> u64 {
        self.deduplicated_events.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            static_graphs_ingested: self.static_graphs_ingested.load(Ordering::Relaxed),
            runtime_events_ingested: self.runtime_events_ingested.load(Ordering::Relaxed),
            deduplicated_events: self.deduplicated_events.load(Ordering::Relaxed),
            enqueue_rejections: self.enqueue_rejections.load(Ordering::Relaxed),
            merges_completed: self.merges_completed.load(Ordering::Relaxed),
            merges_failed: self.merges_failed.load(Ordering::Relaxed),
            exports_completed: self.exports_completed.load(Ordering::Relaxed),
            exports_failed: self.exports_failed.load(Ordering::Relaxed),
            traces_evicted: self.traces_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub static_graphs_ingested: u64,
    pub runtime_events_ingested: u64,
    pub deduplicated_events: u64,
    pub enqueue_rejections: u64,
    pub merges_completed: u64,
    pub merges_failed: u64,
    pub exports_completed: u64,
    pub exports_failed: u64,
    pub traces_evicted: u64,
}

/// Health signal derived from queue pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    Degraded,
}

/// Queue-pressure health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub utilization_percent: u8,
    pub backpressure_threshold: u8,
}

impl HealthReport {
    pub fn from_utilization(
        queue_size: usize,
        queue_capacity: usize,
        utilization_percent: u8,
        backpressure_threshold: u8,
    ) -> Self {
        let status = if utilization_percent >= backpressure_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };
        Self {
            status,
            queue_size,
            queue_capacity,
            utilization_percent,
            backpressure_threshold,
        }
    }
}
