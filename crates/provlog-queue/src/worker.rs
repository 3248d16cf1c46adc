//! At-least-once ingestion worker.
//!
//! Processing order is commit-then-ack: the database transaction commits
//! before the queue message is acknowledged. A crash in between causes a
//! redelivery, which the worker resolves against the store:
//! - the stored row matches the replayed batch → acknowledge, write nothing;
//! - the stored row diverges → dead-letter; divergent evidence is fatal.
//!
//! Hard-rejected input can never succeed and goes straight to the
//! dead-letter destination. Infrastructure failures are nacked for retry
//! with an attempt ceiling.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use provlog_core::error::IngestErrorCode;
use provlog_core::validator::Validator;
use provlog_persist::{IngestBatch, IngestFailure, IngestionService};

use crate::backend::{BatchMessage, QueueBackend, QueueError};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// Delivery attempts before an infrastructure failure dead-letters.
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 5,
        }
    }
}

/// How one message was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transaction committed, message acknowledged.
    Committed,
    /// Redelivery of an already-committed batch; acknowledged without writes.
    AlreadyApplied,
    /// Unprocessable; routed to the dead-letter destination.
    DeadLettered,
    /// Transient failure; returned to the queue for another attempt.
    Requeued,
}

pub struct IngestWorker<Q: QueueBackend> {
    queue: Arc<Q>,
    service: Arc<IngestionService>,
    validator: Validator,
    config: WorkerConfig,
}

impl<Q: QueueBackend> IngestWorker<Q> {
    pub fn new(queue: Arc<Q>, service: Arc<IngestionService>, config: WorkerConfig) -> Self {
        Self {
            queue,
            service,
            validator: Validator::default(),
            config,
        }
    }

    /// Consume until cancelled.
    pub async fn run(&self) {
        info!("ingest worker started");
        loop {
            match self.run_once().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(error = %e, "queue error; backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Process at most one message. `None` when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<Disposition>, QueueError> {
        let Some(message) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        self.process(message).await.map(Some)
    }

    async fn process(&self, message: BatchMessage) -> Result<Disposition, QueueError> {
        let session_id = message.batch.session_id;

        match self.service.ingest_batch(&message.batch).await {
            Ok(receipt) => {
                info!(
                    %session_id,
                    accepted = receipt.accepted_count,
                    sealed = receipt.sealed,
                    "batch committed"
                );
                self.queue.ack(message.message_id).await?;
                Ok(Disposition::Committed)
            }
            Err(failure) => self.resolve_failure(message, failure).await,
        }
    }

    async fn resolve_failure(
        &self,
        message: BatchMessage,
        failure: IngestFailure,
    ) -> Result<Disposition, QueueError> {
        let session_id = message.batch.session_id;

        match &failure {
            // Conflicts are where at-least-once redeliveries surface.
            IngestFailure::Rejected(e)
                if e.error_code == IngestErrorCode::DuplicateSequence
                    || e.error_code == IngestErrorCode::AlreadySealed =>
            {
                match self.already_applied(&message.batch).await {
                    Ok(true) => {
                        info!(
                            %session_id,
                            attempts = message.attempts,
                            "redelivered batch already committed; acknowledging without re-write"
                        );
                        self.queue.ack(message.message_id).await?;
                        Ok(Disposition::AlreadyApplied)
                    }
                    Ok(false) => {
                        error!(
                            %session_id,
                            code = %e.error_code,
                            "replayed batch diverges from committed evidence"
                        );
                        self.queue
                            .dead_letter(
                                message.message_id,
                                "replayed batch diverges from committed events",
                            )
                            .await?;
                        Ok(Disposition::DeadLettered)
                    }
                    // The guard itself hit storage trouble; retry later.
                    Err(_) => self.retry_or_bury(message, "replay guard failed").await,
                }
            }
            // Bad input cannot become good input.
            IngestFailure::Rejected(e) => {
                warn!(%session_id, code = %e.error_code, "batch rejected; dead-lettering");
                self.queue
                    .dead_letter(message.message_id, e.error_code.as_str())
                    .await?;
                Ok(Disposition::DeadLettered)
            }
            // Deterministic over the same inputs: retrying cannot help.
            IngestFailure::Policy(e) => {
                error!(%session_id, error = %e, "policy evaluation failed; dead-lettering");
                self.queue
                    .dead_letter(message.message_id, "policy evaluation failure")
                    .await?;
                Ok(Disposition::DeadLettered)
            }
            IngestFailure::Store(e) => {
                warn!(%session_id, error = %e, "storage failure");
                self.retry_or_bury(message, "storage failure").await
            }
        }
    }

    async fn retry_or_bury(
        &self,
        message: BatchMessage,
        reason: &str,
    ) -> Result<Disposition, QueueError> {
        if message.attempts >= self.config.max_attempts {
            self.queue
                .dead_letter(message.message_id, reason)
                .await?;
            Ok(Disposition::DeadLettered)
        } else {
            self.queue.nack(message.message_id).await?;
            Ok(Disposition::Requeued)
        }
    }

    /// Whether the first event of a replayed batch is already committed,
    /// bit-identical, at its `(session_id, sequence_number)`.
    async fn already_applied(&self, batch: &IngestBatch) -> Result<bool, ()> {
        let Some(first) = batch.events.first() else {
            return Ok(false);
        };
        let Ok(claim) = self.validator.validate(first) else {
            return Ok(false);
        };

        match self
            .service
            .store()
            .event_at(claim.session_id, claim.sequence_number)
            .await
        {
            Ok(Some(stored)) => Ok(stored.event_id == claim.event_id
                && stored.event_type == claim.event_type
                && stored.timestamp_wall == claim.timestamp_wall
                && stored.payload_hash == claim.payload_hash),
            Ok(None) => Ok(false),
            Err(_) => Err(()),
        }
    }
}
