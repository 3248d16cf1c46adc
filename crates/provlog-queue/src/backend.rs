//! Queue backend trait and message types.
//!
//! The trait is the transport boundary: a Redis stream, a SQL table, or the
//! in-memory queue all satisfy the same contract. Delivery is at-least-once;
//! a message stays in-flight until acknowledged, nacked back onto the queue,
//! or routed to the dead-letter destination.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use provlog_persist::IngestBatch;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("unknown message: {0}")]
    UnknownMessage(Uuid),
}

/// One queued ingestion batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMessage {
    pub message_id: Uuid,
    pub batch: IngestBatch,
    /// Delivery attempts so far, including this one.
    pub attempts: u32,
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Enqueue a batch for ingestion.
    async fn enqueue(&self, batch: IngestBatch) -> Result<Uuid, QueueError>;

    /// Take the next message, moving it in-flight.
    async fn dequeue(&self) -> Result<Option<BatchMessage>, QueueError>;

    /// Acknowledge a message after its transaction committed (or after it was
    /// detected as already applied).
    async fn ack(&self, message_id: Uuid) -> Result<(), QueueError>;

    /// Return an in-flight message to the queue for redelivery.
    async fn nack(&self, message_id: Uuid) -> Result<(), QueueError>;

    /// Route an unprocessable message to the dead-letter destination.
    async fn dead_letter(&self, message_id: Uuid, reason: &str) -> Result<(), QueueError>;

    /// Messages waiting for delivery.
    async fn pending(&self) -> Result<usize, QueueError>;
}
