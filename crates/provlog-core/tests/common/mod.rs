//! Shared fixtures: build real sealed chains and export them.

use provlog_core::{export, ChainState, SealMode, SealedEvent, Sealer, Validator};
use serde_json::{json, Value};
use uuid::Uuid;

pub const SESSION: &str = "b9a6d7c8-2f3e-4a5b-8c9d-0e1f2a3b4c5d";
pub const AUTHORITY: &str = "provlog-ingest-v1";

/// Seal a contiguous chain of (event_type, payload) pairs.
pub fn seal_chain(specs: &[(&str, Value)]) -> Vec<SealedEvent> {
    let validator = Validator::default();
    let sealer = Sealer::new(AUTHORITY, SealMode::Strict);
    let mut chain: Vec<SealedEvent> = Vec::new();
    let mut state: Option<ChainState> = None;

    for (i, (event_type, payload)) in specs.iter().enumerate() {
        let claim = validator
            .validate(&json!({
                "event_id": Uuid::new_v4().to_string(),
                "session_id": SESSION,
                "sequence_number": i,
                "timestamp_wall": format!("2024-05-01T12:00:{:02}Z", i % 60),
                "event_type": event_type,
                "payload": payload,
            }))
            .expect("fixture claim validates");
        let sealed = sealer
            .seal(&claim, state.as_ref())
            .expect("fixture claim seals")
            .event;
        state = Some(ChainState {
            session_id: sealed.session_id,
            last_sequence: sealed.sequence_number,
            last_event_hash: sealed.event_hash.clone(),
            closed: sealed.event_type.closes_session(),
        });
        chain.push(sealed);
    }
    chain
}

pub fn export_events(chain: &[SealedEvent]) -> Vec<Value> {
    chain
        .iter()
        .map(|e| export::exported_event(e).expect("committed payload parses"))
        .collect()
}

/// A seal block whose digest matches the chain.
pub fn seal_block(chain: &[SealedEvent]) -> Value {
    let hashes: Vec<String> = chain.iter().map(|e| e.event_hash.clone()).collect();
    let final_hash = hashes.last().cloned().unwrap_or_default();
    json!({
        "session_id": SESSION,
        "sealing_authority_id": AUTHORITY,
        "seal_timestamp": "2024-05-01T12:10:00.000Z",
        "session_digest": provlog_core::hash::session_digest(SESSION, &hashes, &final_hash),
        "final_event_hash": final_hash,
        "event_count": chain.len(),
    })
}
