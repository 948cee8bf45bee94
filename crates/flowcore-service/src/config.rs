//! Configuration for the Flow Core service.
//!
//! Plain structs with defaults; the embedding layer decides where values
//! come from (env, files, flags). All fields have sensible defaults via the
//! [`Default`] impls.

use std::time::Duration;

/// Top-level configuration, grouped by concern.
#[derive(Debug, Clone, Default)]
pub struct FlowCoreConfig {
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub trace: TraceRetentionConfig,
    pub export: ExportConfig,
    pub features: FeatureFlags,
}

/// Ingestion queue bounds and the backpressure signal.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum queued work items. Default: 10 000.
    pub capacity: usize,
    /// Utilization percent above which health reports degraded. Default: 80.
    pub backpressure_threshold: u8,
    /// How long ingress waits for queue space before surfacing QUEUE_FULL.
    /// Default: 5 s.
    pub enqueue_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            backpressure_threshold: 80,
            enqueue_timeout: Duration::from_secs(5),
        }
    }
}

/// Worker pool sizing and cadence.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of consumers. Default: 2.
    pub count: usize,
    /// Dequeue poll timeout; bounds shutdown latency. Default: 100 ms.
    pub poll_timeout: Duration,
    /// Queue drain budget once the stop flag is observed. Default: 5 s.
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 2,
            poll_timeout: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Trace buffer retention bounds.
#[derive(Debug, Clone)]
pub struct TraceRetentionConfig {
    /// Retention of merged traces after completion. Default: 10 min.
    pub ttl: Duration,
    /// Hard cap on buffered traces; oldest `created_at` evicted first.
    /// Default: 100 000.
    pub max_count: usize,
    /// Cadence of the periodic eviction task. Default: 60 s.
    pub eviction_interval: Duration,
    /// Traces that never complete are forcibly evicted past this age.
    /// Default: 24 h.
    pub hard_ttl: Duration,
}

impl Default for TraceRetentionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10 * 60),
            max_count: 100_000,
            eviction_interval: Duration::from_secs(60),
            hard_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Analytics export settings.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Driver-level timeout for one push. Default: 30 s.
    pub push_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(30),
        }
    }
}

/// Optional behaviors.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    /// Master switch for event deduplication. Default: on.
    pub dedup_enabled: bool,
    /// Strict mode for the merge validator (rejects self-loops, requires
    /// assigned zoom levels). Default: off.
    pub strict_validation: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            dedup_enabled: true,
            strict_validation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = FlowCoreConfig::default();
        assert_eq!(config.queue.capacity, 10_000);
        assert_eq!(config.queue.backpressure_threshold, 80);
        assert_eq!(config.queue.enqueue_timeout, Duration::from_secs(5));
        assert_eq!(config.worker.count, 2);
        assert_eq!(config.worker.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.trace.ttl, Duration::from_secs(600));
        assert_eq!(config.trace.eviction_interval, Duration::from_secs(60));
        assert!(config.features.dedup_enabled);
        assert!(!config.features.strict_validation);
    }
}
