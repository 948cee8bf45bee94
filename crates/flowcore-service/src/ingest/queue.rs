//! Bounded ingestion queue decoupling ingress handlers from processing.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel plus an exact depth
//! counter for the utilization gauge. A full queue is backpressure: enqueue
//! returns `false` within the caller's timeout and the caller surfaces
//! QUEUE_FULL — rejected items are never silently retained.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ingest::work_item::WorkItem;

pub struct IngestQueue {
    tx: mpsc::Sender<WorkItem>,
    rx: tokio::sync::Mutex<mpsc::Receiver<WorkItem>>,
    depth: AtomicUsize,
    capacity: usize,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            depth: AtomicUsize::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue, waiting up to `timeout` for space. A zero timeout attempts
    /// immediately. Returns `false` when the queue stayed full.
    pub async fn enqueue(&self, item: WorkItem, timeout: Duration) -> bool {
        let permit = if timeout.is_zero() {
            self.tx.try_reserve().ok()
        } else {
            match tokio::time::timeout(timeout, self.tx.reserve()).await {
                Ok(Ok(permit)) => Some(permit),
                _ => None,
            }
        };
        match permit {
            Some(permit) => {
                debug!(entity_id = %item.entity_id(), "work item enqueued");
                permit.send(item);
                self.depth.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => {
                warn!(entity_id = %item.entity_id(), "queue full, rejecting work item");
                false
            }
        }
    }

    /// Dequeue, waiting up to `timeout` for an item.
    pub async fn dequeue(&self, timeout: Duration) -> Option<WorkItem> {
        let mut rx = self.rx.lock().await;
        let item = if timeout.is_zero() {
            rx.try_recv().ok()
        } else {
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(item) => item,
                Err(_) => None,
            }
        };
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        item
    }

    pub fn size(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn utilization_percent(&self) -> u8 {
        let size = self.size().min(self.capacity);
        ((size * 100) / self.capacity) as u8
    }

    /// Drop everything currently queued. Returns how many items were
    /// discarded.
    pub async fn clear(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut cleared = 0;
        while rx.try_recv().is_ok() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            cleared += 1;
        }
        if cleared > 0 {
            info!(cleared, "queue cleared");
        }
        cleared
    }
}
