//! In-memory queue for tests and single-node deployments.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

use provlog_persist::IngestBatch;

use crate::backend::{BatchMessage, QueueBackend, QueueError};

#[derive(Default)]
struct State {
    ready: VecDeque<BatchMessage>,
    in_flight: HashMap<Uuid, BatchMessage>,
    dead: Vec<(BatchMessage, String)>,
}

/// Unbounded in-memory queue with explicit in-flight tracking.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dead-lettered messages with their reasons, oldest first.
    pub async fn dead_letters(&self) -> Vec<(BatchMessage, String)> {
        self.state.lock().await.dead.clone()
    }

    /// Messages dequeued but not yet resolved.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Simulate a consumer crash: every in-flight message returns to the
    /// queue for redelivery.
    pub async fn requeue_in_flight(&self) {
        let mut state = self.state.lock().await;
        let mut stranded: Vec<BatchMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
        stranded.sort_by_key(|m| m.attempts);
        for mut message in stranded {
            message.attempts += 1;
            state.ready.push_back(message);
        }
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn enqueue(&self, batch: IngestBatch) -> Result<Uuid, QueueError> {
        let message_id = Uuid::new_v4();
        self.state.lock().await.ready.push_back(BatchMessage {
            message_id,
            batch,
            attempts: 1,
        });
        Ok(message_id)
    }

    async fn dequeue(&self) -> Result<Option<BatchMessage>, QueueError> {
        let mut state = self.state.lock().await;
        let Some(message) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.in_flight.insert(message.message_id, message.clone());
        Ok(Some(message))
    }

    async fn ack(&self, message_id: Uuid) -> Result<(), QueueError> {
        self.state
            .lock()
            .await
            .in_flight
            .remove(&message_id)
            .map(|_| ())
            .ok_or(QueueError::UnknownMessage(message_id))
    }

    async fn nack(&self, message_id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let mut message = state
            .in_flight
            .remove(&message_id)
            .ok_or(QueueError::UnknownMessage(message_id))?;
        message.attempts += 1;
        state.ready.push_back(message);
        Ok(())
    }

    async fn dead_letter(&self, message_id: Uuid, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let message = state
            .in_flight
            .remove(&message_id)
            .ok_or(QueueError::UnknownMessage(message_id))?;
        state.dead.push((message, reason.to_string()));
        Ok(())
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().await.ready.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch() -> IngestBatch {
        IngestBatch {
            session_id: Uuid::new_v4(),
            events: vec![json!({"sequence_number": 0})],
            seal: false,
        }
    }

    #[tokio::test]
    async fn enqueue_dequeue_ack() {
        let queue = MemoryQueue::new();
        let id = queue.enqueue(batch()).await.unwrap();

        let message = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(message.message_id, id);
        assert_eq!(message.attempts, 1);
        assert_eq!(queue.pending().await.unwrap(), 0);
        assert_eq!(queue.in_flight().await, 1);

        queue.ack(id).await.unwrap();
        assert_eq!(queue.in_flight().await, 0);
    }

    #[tokio::test]
    async fn nack_redelivers_with_bumped_attempts() {
        let queue = MemoryQueue::new();
        let id = queue.enqueue(batch()).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        queue.nack(first.message_id).await.unwrap();

        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.message_id, id);
        assert_eq!(second.attempts, 2);
    }

    #[tokio::test]
    async fn crash_simulation_requeues_in_flight() {
        let queue = MemoryQueue::new();
        queue.enqueue(batch()).await.unwrap();
        let message = queue.dequeue().await.unwrap().unwrap();

        queue.requeue_in_flight().await;
        assert_eq!(queue.in_flight().await, 0);

        let replayed = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(replayed.message_id, message.message_id);
        assert_eq!(replayed.attempts, 2);
    }

    #[tokio::test]
    async fn dead_letter_records_the_reason() {
        let queue = MemoryQueue::new();
        queue.enqueue(batch()).await.unwrap();
        let message = queue.dequeue().await.unwrap().unwrap();

        queue.dead_letter(message.message_id, "divergent replay").await.unwrap();
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].1, "divergent replay");
    }
}
