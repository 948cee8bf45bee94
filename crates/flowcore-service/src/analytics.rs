//! Push of exported Cypher to the external analytics store.
//!
//! The concrete driver lives behind the [`AnalyticsWriter`] trait; the core
//! only builds statements and reports outcomes. Pushes run with their own
//! driver-level timeout and never share capacity with the ingest worker
//! pool, so a stalled analytics store cannot back-pressure ingestion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::metrics::IngestMetrics;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics store not connected")]
    NotConnected,
    #[error("analytics write failed: {message}")]
    Write { message: String },
}

/// Seam for the external analytics driver.
#[async_trait]
pub trait AnalyticsWriter: Send + Sync {
    async fn write(&self, graph_id: &str, statements: &[String]) -> Result<(), AnalyticsError>;

    fn is_connected(&self) -> bool {
        true
    }
}

/// Default writer when no analytics store is wired: reports disconnected so
/// pushes surface UNAVAILABLE instead of silently succeeding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedWriter;

#[async_trait]
impl AnalyticsWriter for DisconnectedWriter {
    async fn write(&self, _graph_id: &str, _statements: &[String]) -> Result<(), AnalyticsError> {
        Err(AnalyticsError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// Result record of one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub graph_id: String,
    pub statement_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub duration_ms: u64,
}

pub struct AnalyticsExporter {
    writer: Arc<dyn AnalyticsWriter>,
    push_timeout: Duration,
    metrics: Arc<IngestMetrics>,
}

impl AnalyticsExporter {
    pub fn new(
        writer: Arc<dyn AnalyticsWriter>,
        push_timeout: Duration,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            writer,
            push_timeout,
            metrics,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_connected()
    }

    /// Run one push with the driver timeout. Failures are counted and
    /// returned; they never affect other pushes.
    pub async fn push(
        &self,
        graph_id: &str,
        statements: Vec<String>,
        node_count: usize,
        edge_count: usize,
    ) -> Result<ExportOutcome, AnalyticsError> {
        let started = Instant::now();
        let written = tokio::time::timeout(
            self.push_timeout,
            self.writer.write(graph_id, &statements),
        )
        .await;
        let result = match written {
            Ok(result) => result,
            Err(_) => Err(AnalyticsError::Write {
                message: format!(
                    "push timed out after {} ms",
                    self.push_timeout.as_millis()
                ),
            }),
        };

        match result {
            Ok(()) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_export_completed();
                info!(
                    graph_id = %graph_id,
                    nodes = node_count,
                    edges = edge_count,
                    duration_ms,
                    "graph exported to analytics store"
                );
                Ok(ExportOutcome {
                    graph_id: graph_id.to_string(),
                    statement_count: statements.len(),
                    node_count,
                    edge_count,
                    duration_ms,
                })
            }
            Err(err) => {
                self.metrics.record_export_failed();
                error!(graph_id = %graph_id, "analytics push failed: {err}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Writer that records what it was asked to write.
    #[derive(Default)]
    struct RecordingWriter {
        pushes: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl AnalyticsWriter for RecordingWriter {
        async fn write(
            &self,
            graph_id: &str,
            statements: &[String],
        ) -> Result<(), AnalyticsError> {
            self.pushes
                .lock()
                .push((graph_id.to_string(), statements.len()));
            Ok(())
        }
    }

    struct FailingWriter;

    #[async_trait]
    impl AnalyticsWriter for FailingWriter {
        async fn write(&self, _: &str, _: &[String]) -> Result<(), AnalyticsError> {
            Err(AnalyticsError::Write {
                message: "connection refused".to_string(),
            })
        }
    }

    struct StallingWriter;

    #[async_trait]
    impl AnalyticsWriter for StallingWriter {
        async fn write(&self, _: &str, _: &[String]) -> Result<(), AnalyticsError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn statements() -> Vec<String> {
        vec!["MERGE (g:FlowGraph {graphId: 'g1'});".to_string()]
    }

    #[tokio::test]
    async fn successful_push_yields_an_outcome_record() {
        let writer = Arc::new(RecordingWriter::default());
        let metrics = Arc::new(IngestMetrics::new());
        let exporter =
            AnalyticsExporter::new(writer.clone(), Duration::from_secs(1), metrics.clone());

        let outcome = exporter.push("g1", statements(), 3, 2).await.unwrap();
        assert_eq!(outcome.graph_id, "g1");
        assert_eq!(outcome.statement_count, 1);
        assert_eq!(outcome.node_count, 3);
        assert_eq!(writer.pushes.lock().len(), 1);
        assert_eq!(metrics.snapshot().exports_completed, 1);
    }

    #[tokio::test]
    async fn driver_failure_is_counted_and_returned() {
        let metrics = Arc::new(IngestMetrics::new());
        let exporter =
            AnalyticsExporter::new(Arc::new(FailingWriter), Duration::from_secs(1), metrics.clone());

        assert!(exporter.push("g1", statements(), 1, 0).await.is_err());
        assert_eq!(metrics.snapshot().exports_failed, 1);
    }

    #[tokio::test]
    async fn stalled_driver_hits_the_push_timeout() {
        let metrics = Arc::new(IngestMetrics::new());
        let exporter = AnalyticsExporter::new(
            Arc::new(StallingWriter),
            Duration::from_millis(20),
            metrics.clone(),
        );

        let err = exporter.push("g1", statements(), 1, 0).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(metrics.snapshot().exports_failed, 1);
    }

    #[tokio::test]
    async fn disconnected_writer_reports_not_connected() {
        let exporter = AnalyticsExporter::new(
            Arc::new(DisconnectedWriter),
            Duration::from_secs(1),
            Arc::new(IngestMetrics::new()),
        );
        assert!(!exporter.is_connected());
        assert!(matches!(
            exporter.push("g1", statements(), 1, 0).await,
            Err(AnalyticsError::NotConnected)
        ));
    }
}
