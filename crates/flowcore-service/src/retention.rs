//! Periodic trace eviction.
//!
//! A single ticker drives `TraceBuffer::evict_expired` on a fixed cadence.
//! TTL decisions themselves come from the buffer's injected clock; the
//! ticker only supplies the cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::store::TraceBuffer;

/// Handle to the running eviction task. Allows graceful shutdown.
pub struct RetentionHandle {
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl RetentionHandle {
    /// Spawn the eviction loop.
    pub fn spawn(trace_buffer: Arc<TraceBuffer>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Don't fire immediately on creation.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => return,
                    _ = ticker.tick() => {
                        let evicted = trace_buffer.evict_expired();
                        if evicted > 0 {
                            debug!(evicted, "eviction sweep removed traces");
                        }
                    }
                }
            }
        });
        Self {
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TraceRetentionConfig;
    use crate::metrics::IngestMetrics;
    use crate::store::EventDeduplicator;
    use chrono::DateTime;
    use flowcore_engine::{EventType, RuntimeEvent};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn ticker_evicts_on_cadence() {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp_millis(0).unwrap(),
        ));
        let buffer = Arc::new(TraceBuffer::new(
            clock.clone(),
            Arc::new(EventDeduplicator::new(true)),
            TraceRetentionConfig {
                ttl: Duration::from_secs(1),
                ..TraceRetentionConfig::default()
            },
            Arc::new(IngestMetrics::new()),
        ));

        buffer.append(
            "t1",
            "g1",
            &[RuntimeEvent {
                event_id: None,
                event_type: EventType::MethodEnter,
                timestamp: DateTime::from_timestamp_millis(0).unwrap(),
                node_id: "a".to_string(),
                span_id: Some("s1".to_string()),
                parent_span_id: None,
                duration_ms: None,
                correlation_id: None,
                error_message: None,
                error_type: None,
                attributes: BTreeMap::new(),
            }],
        );
        buffer.mark_complete("t1");
        buffer.mark_merged("t1");
        clock.advance(chrono::Duration::seconds(2));

        let handle = RetentionHandle::spawn(buffer.clone(), Duration::from_millis(20));
        for _ in 0..100 {
            if buffer.count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(buffer.count(), 0);
        handle.shutdown().await;
    }
}
