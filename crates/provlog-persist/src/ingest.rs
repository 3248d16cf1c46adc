//! Ingestion orchestrator.
//!
//! Coordinates one batch inside a single database transaction:
//! lock session → check seal state → read chain state → validate and seal
//! each event → persist → optional chain seal → policy evaluation → commit.
//! Any failure anywhere rolls back the whole batch; partial writes are
//! forbidden.
//!
//! Invariants enforced here:
//! - Producer hashes are never trusted; every hash is recomputed server-side.
//! - Sequence is the only ordering authority; timestamps are opaque.
//! - Sealed sessions accept nothing.
//! - `seal=true` requires SESSION_END as the last event of the batch.
//! - Every committed event carries this service's chain authority.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use provlog_core::error::{IngestError, IngestErrorCode};
use provlog_core::event::{ChainSeal, ChainState};
use provlog_core::hash;
use provlog_core::policy::{CanonicalEvent, PolicyEngine, PolicyError};
use provlog_core::sealer::{SealMode, Sealer};
use provlog_core::validator::Validator;
use provlog_core::verifier::SessionClassification;

use crate::config::ServiceConfig;
use crate::store::{self, EventStore, StoreError};

/// One ingestion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestBatch {
    pub session_id: Uuid,
    pub events: Vec<Value>,
    #[serde(default)]
    pub seal: bool,
}

/// Result of a committed batch.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub accepted_count: usize,
    pub final_hash: String,
    pub sealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seal_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_class: Option<String>,
    pub violation_count: usize,
}

/// Why a batch failed. `Rejected` carries the client-facing error object;
/// the other variants are infrastructure failures and stay server-side.
#[derive(Debug, thiserror::Error)]
pub enum IngestFailure {
    #[error(transparent)]
    Rejected(#[from] IngestError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestFailure {
    /// The structured error object for producers, when this is a rejection.
    pub fn rejection(&self) -> Option<&IngestError> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_conflict(&self, code: IngestErrorCode) -> bool {
        matches!(self, Self::Rejected(e) if e.error_code == code)
    }
}

/// Authoritative ingestion service. One per process; the sealer inside is
/// constructed once and its authority identifier never changes.
pub struct IngestionService {
    store: EventStore,
    validator: Validator,
    sealer: Sealer,
    engine: PolicyEngine,
    max_batch_size: usize,
}

impl IngestionService {
    pub fn new(store: EventStore, engine: PolicyEngine, config: &ServiceConfig) -> Self {
        Self {
            store,
            validator: Validator::new(config.max_payload_bytes),
            // Production ingestion is strict; gaps are never admitted here.
            sealer: Sealer::new(config.chain_authority.clone(), SealMode::Strict),
            engine,
            max_batch_size: config.max_batch_size,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn authority(&self) -> &str {
        self.sealer.authority()
    }

    /// Ingest one batch atomically.
    pub async fn ingest_batch(&self, batch: &IngestBatch) -> Result<IngestReceipt, IngestFailure> {
        if batch.events.len() > self.max_batch_size {
            return Err(IngestError::schema_invalid(json!({
                "error": "batch exceeds size limit",
                "limit": self.max_batch_size,
                "received": batch.events.len(),
            }))
            .into());
        }

        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // 1. Lock. The session upsert takes the write lock that serializes
        // concurrent batches; the loser waits here and then sees the winner's
        // committed state.
        let now = store::now_iso();
        store::lock_session(&mut tx, batch.session_id, &now).await?;

        // 2. Sealed sessions accept nothing. A bare re-seal request is
        // idempotent and returns the existing seal.
        let status = store::session_status(&mut tx, batch.session_id).await?;
        if status.as_deref() == Some("sealed") {
            if batch.seal && batch.events.is_empty() {
                let seal = store::get_seal(&mut tx, batch.session_id)
                    .await?
                    .ok_or_else(|| StoreError::Query("sealed session has no seal row".into()))?;
                debug!(session_id = %batch.session_id, "re-seal request; returning existing seal");
                return Ok(Self::reseal_receipt(seal));
            }
            return Err(IngestError::already_sealed(batch.session_id).into());
        }

        if batch.events.is_empty() {
            if batch.seal {
                return Err(
                    IngestError::invalid_seal_request("cannot seal with an empty batch").into(),
                );
            }
            return Err(
                IngestError::schema_invalid(json!({"error": "events list cannot be empty"})).into(),
            );
        }

        // 3. Chain state under the lock.
        let mut state = store::chain_state(&mut tx, batch.session_id).await?;

        // 4a. Batch boundary: the first event must extend the committed chain
        // by exactly one (or open it at zero).
        if let Some(first_seq) = batch.events[0].get("sequence_number").and_then(Value::as_u64) {
            let expected = state.as_ref().map(|s| s.last_sequence + 1).unwrap_or(0);
            if first_seq < expected {
                return Err(IngestError::duplicate_sequence(batch.session_id, first_seq).into());
            }
            if first_seq > expected {
                return Err(IngestError::sequence_gap(expected, first_seq).into());
            }
        }

        // 5. Seal requests must terminate with SESSION_END.
        if batch.seal {
            let last_type = batch
                .events
                .last()
                .and_then(|e| e.get("event_type"))
                .and_then(Value::as_str);
            if last_type != Some("SESSION_END") {
                return Err(IngestError::invalid_seal_request(&format!(
                    "last event must be SESSION_END, got {}",
                    last_type.unwrap_or("<absent>")
                ))
                .into());
            }
        }

        // 4b. Validate and seal in order, threading prev_event_hash through
        // the batch, then persist.
        let mut committed: Vec<CanonicalEvent> = Vec::with_capacity(batch.events.len());
        let mut final_hash = String::new();
        for raw in &batch.events {
            let claim = self.validator.validate(raw)?;
            if claim.session_id != batch.session_id {
                return Err(IngestError::schema_invalid(json!({
                    "field": "session_id",
                    "error": "event session_id does not match the batch",
                }))
                .into());
            }

            let sealed = self.sealer.seal(&claim, state.as_ref())?.event;

            match store::insert_event(&mut tx, &sealed).await {
                Ok(()) => {}
                Err(StoreError::DuplicateSequence {
                    session_id,
                    sequence_number,
                }) => {
                    return Err(IngestError::duplicate_sequence(session_id, sequence_number).into())
                }
                Err(e) => return Err(e.into()),
            }

            final_hash = sealed.event_hash.clone();
            state = Some(ChainState {
                session_id: sealed.session_id,
                last_sequence: sealed.sequence_number,
                last_event_hash: sealed.event_hash.clone(),
                closed: state.as_ref().map(|s| s.closed).unwrap_or(false)
                    || sealed.event_type.closes_session(),
            });
            committed.push(CanonicalEvent::from(&sealed));
        }

        // 6. Chain seal.
        let mut seal_result: Option<ChainSeal> = None;
        let mut evidence_class: Option<String> = None;
        if batch.seal {
            let all_events = store::session_events(&mut tx, batch.session_id).await?;
            let hashes: Vec<&str> = all_events.iter().map(|e| e.event_hash.as_str()).collect();
            let chain_final = hashes.last().copied().unwrap_or_default();
            let session_key = batch.session_id.to_string();

            let seal = ChainSeal {
                session_id: batch.session_id,
                sealing_authority_id: self.sealer.authority().to_string(),
                seal_timestamp: store::now_iso(),
                session_digest: hash::session_digest(&session_key, &hashes, chain_final),
                final_event_hash: chain_final.to_string(),
                event_count: all_events.len() as u64,
            };
            store::insert_seal(&mut tx, &seal).await?;

            // Sealed, chain valid by construction, SESSION_END enforced above:
            // authoritative unless events were dropped.
            let has_drops = all_events
                .iter()
                .any(|e| e.event_type == provlog_core::event::EventType::LogDrop);
            let class = if has_drops {
                SessionClassification::NonAuthoritativeEvidence
            } else {
                SessionClassification::AuthoritativeEvidence
            };
            store::mark_sealed(
                &mut tx,
                batch.session_id,
                &seal.seal_timestamp,
                class.as_str(),
            )
            .await?;

            let hash_prefix = &seal.final_event_hash[..16.min(seal.final_event_hash.len())];
            info!(
                session_id = %batch.session_id,
                event_count = seal.event_count,
                final_hash = %hash_prefix,
                "session sealed"
            );
            evidence_class = Some(class.as_str().to_string());
            seal_result = Some(seal);
        }

        // 7. Policies run over the just-committed events in the same
        // transaction. A policy failure unwinds everything: governance
        // metadata cannot be partially committed alongside evidence.
        let violations = self.engine.evaluate(&committed)?;
        let created_at = store::now_iso();
        for record in &violations {
            store::insert_violation(&mut tx, Uuid::new_v4(), record, &created_at).await?;
        }

        // 8. Commit.
        tx.commit()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        debug!(
            session_id = %batch.session_id,
            accepted = committed.len(),
            violations = violations.len(),
            "batch committed"
        );

        Ok(IngestReceipt {
            accepted_count: committed.len(),
            final_hash,
            sealed: seal_result.is_some(),
            seal_timestamp: seal_result.as_ref().map(|s| s.seal_timestamp.clone()),
            session_digest: seal_result.as_ref().map(|s| s.session_digest.clone()),
            evidence_class,
            violation_count: violations.len(),
        })
    }

    fn reseal_receipt(seal: ChainSeal) -> IngestReceipt {
        IngestReceipt {
            accepted_count: 0,
            final_hash: seal.final_event_hash.clone(),
            sealed: true,
            seal_timestamp: Some(seal.seal_timestamp),
            session_digest: Some(seal.session_digest),
            evidence_class: None,
            violation_count: 0,
        }
    }
}
