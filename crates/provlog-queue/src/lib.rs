//! # Provlog Queue
//!
//! Durable-queue ingestion with at-least-once delivery.
//!
//! The worker commits the database transaction before acknowledging the
//! message. A crash between commit and ack replays the batch; the worker
//! detects the already-committed rows and acknowledges without re-writing.
//! A replayed batch that diverges from committed evidence goes to the
//! dead-letter destination.

pub mod backend;
pub mod memory;
pub mod worker;

pub use backend::{BatchMessage, QueueBackend, QueueError};
pub use memory::MemoryQueue;
pub use worker::{Disposition, IngestWorker, WorkerConfig};
