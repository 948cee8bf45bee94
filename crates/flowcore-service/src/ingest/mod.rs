//! The ingestion pipeline: bounded queue, work items, and the worker pool.

pub mod queue;
pub mod work_item;
pub mod worker;

pub use queue::IngestQueue;
pub use work_item::WorkItem;
pub use worker::{WorkerContext, WorkerPool};
