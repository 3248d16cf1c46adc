//! The sealer: the only origin of `event_hash` and `chain_authority`.
//!
//! Given a validated claim and the current chain state of its session, the
//! sealer enforces sequence discipline, links the claim to its predecessor by
//! hash, computes the authoritative hashes, and stamps the authority
//! identifier. No other component may compute or assign either field.
//!
//! The authority identifier is fixed at construction and immutable for the
//! lifetime of the sealer; services construct exactly one at startup.

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::canonical;
use crate::error::IngestError;
use crate::event::{ChainState, EventType, SealedEvent, ValidatedClaim};
use crate::hash;

/// Authority identifier stamped by this service version.
pub const DEFAULT_CHAIN_AUTHORITY: &str = "provlog-ingest-v1";

/// Gap handling mode. Production ingestion runs strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealMode {
    /// Sequence gaps are fatal.
    Strict,
    /// A gap is documented with a LOG_DROP meta-event and the claim is
    /// admitted at its claimed sequence. Gaps are never closed or renumbered.
    Permissive,
}

/// Result of sealing one claim.
#[derive(Debug, Clone, PartialEq)]
pub struct SealOutcome {
    /// LOG_DROP meta-event documenting a gap. Permissive mode only.
    pub drop_event: Option<SealedEvent>,
    /// The sealed claim.
    pub event: SealedEvent,
}

/// The signed envelope. Exactly these seven fields feed `event_hash`;
/// canonical key ordering is established by the JCS key sort.
#[derive(Serialize)]
struct SignedEnvelope<'a> {
    event_id: &'a Uuid,
    session_id: &'a Uuid,
    sequence_number: u64,
    timestamp_wall: &'a str,
    event_type: &'a str,
    payload_hash: &'a str,
    prev_event_hash: Option<&'a str>,
}

/// Seals validated claims into the session chain.
#[derive(Debug, Clone)]
pub struct Sealer {
    authority: String,
    mode: SealMode,
}

impl Sealer {
    pub fn new(authority: impl Into<String>, mode: SealMode) -> Self {
        Self {
            authority: authority.into(),
            mode,
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn mode(&self) -> SealMode {
        self.mode
    }

    /// Seal a claim against the session's current chain state.
    ///
    /// `chain_state` is `None` for a brand new session (genesis).
    pub fn seal(
        &self,
        claim: &ValidatedClaim,
        chain_state: Option<&ChainState>,
    ) -> Result<SealOutcome, IngestError> {
        let Some(state) = chain_state else {
            if claim.sequence_number != 0 {
                return Err(IngestError::invalid_first_sequence(claim.sequence_number));
            }
            let event = self.seal_claim(claim, None)?;
            return Ok(SealOutcome {
                drop_event: None,
                event,
            });
        };

        if state.closed {
            return Err(IngestError::session_closed(claim.session_id));
        }
        if claim.sequence_number <= state.last_sequence {
            return Err(IngestError::sequence_rewind(
                state.last_sequence,
                claim.sequence_number,
            ));
        }

        let expected = state.last_sequence + 1;
        if claim.sequence_number == expected {
            let event = self.seal_claim(claim, Some(&state.last_event_hash))?;
            return Ok(SealOutcome {
                drop_event: None,
                event,
            });
        }

        match self.mode {
            SealMode::Strict => Err(IngestError::log_gap(expected, claim.sequence_number)),
            SealMode::Permissive => {
                let drop_event = self.seal_gap_notice(claim, state, expected)?;
                let event = self.seal_claim(claim, Some(&drop_event.event_hash))?;
                Ok(SealOutcome {
                    drop_event: Some(drop_event),
                    event,
                })
            }
        }
    }

    fn seal_claim(
        &self,
        claim: &ValidatedClaim,
        prev_event_hash: Option<&str>,
    ) -> Result<SealedEvent, IngestError> {
        let event_hash = compute_event_hash(
            &claim.event_id,
            &claim.session_id,
            claim.sequence_number,
            &claim.timestamp_wall,
            claim.event_type,
            &claim.payload_hash,
            prev_event_hash,
        )?;

        Ok(SealedEvent {
            event_id: claim.event_id,
            session_id: claim.session_id,
            sequence_number: claim.sequence_number,
            timestamp_wall: claim.timestamp_wall.clone(),
            event_type: claim.event_type,
            payload_canonical: claim.payload_canonical.clone(),
            payload_hash: claim.payload_hash.clone(),
            prev_event_hash: prev_event_hash.map(str::to_string),
            event_hash,
            chain_authority: self.authority.clone(),
            timestamp_monotonic: claim.timestamp_monotonic,
            source_sdk_ver: claim.source_sdk_ver.clone(),
            schema_ver: claim.schema_ver.clone(),
        })
    }

    /// Document a sequence gap with a LOG_DROP meta-event at the next
    /// contiguous slot. The dropped range is recorded verbatim; nothing is
    /// synthesized in its place.
    fn seal_gap_notice(
        &self,
        claim: &ValidatedClaim,
        state: &ChainState,
        expected: u64,
    ) -> Result<SealedEvent, IngestError> {
        let gap_end = claim.sequence_number - 1;
        let payload = json!({
            "dropped_count": claim.sequence_number - expected,
            "reason": "sequence_gap",
            "gap_start": expected,
            "gap_end": gap_end,
        });
        let payload_canonical = canonical::to_canonical_string(&payload)
            .map_err(|e| IngestError::jcs_invalid(json!({"error": e.to_string()})))?;
        let payload_hash = hash::sha256_hex(payload_canonical.as_bytes());

        let event_id = Uuid::new_v4();
        let event_hash = compute_event_hash(
            &event_id,
            &claim.session_id,
            expected,
            &claim.timestamp_wall,
            EventType::LogDrop,
            &payload_hash,
            Some(&state.last_event_hash),
        )?;

        Ok(SealedEvent {
            event_id,
            session_id: claim.session_id,
            sequence_number: expected,
            timestamp_wall: claim.timestamp_wall.clone(),
            event_type: EventType::LogDrop,
            payload_canonical,
            payload_hash,
            prev_event_hash: Some(state.last_event_hash.clone()),
            event_hash,
            chain_authority: self.authority.clone(),
            timestamp_monotonic: None,
            source_sdk_ver: None,
            schema_ver: None,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn compute_event_hash(
    event_id: &Uuid,
    session_id: &Uuid,
    sequence_number: u64,
    timestamp_wall: &str,
    event_type: EventType,
    payload_hash: &str,
    prev_event_hash: Option<&str>,
) -> Result<String, IngestError> {
    let envelope = SignedEnvelope {
        event_id,
        session_id,
        sequence_number,
        timestamp_wall,
        event_type: event_type.as_str(),
        payload_hash,
        prev_event_hash,
    };
    let bytes = canonical::to_canonical_bytes(&envelope)
        .map_err(|e| IngestError::jcs_invalid(json!({"error": e.to_string()})))?;
    Ok(hash::sha256_hex(&bytes))
}
