//! Frozen contracts.
//!
//! These values are the external interface of the system: wire codes, exit
//! codes, the event type set, and the hash construction itself. The golden
//! digests were computed by an independent implementation of the canonical
//! form; a change in any of these tests is a breaking change for every
//! producer and every previously exported session.

use provlog_core::error::{ErrorClassification, IngestError, IngestErrorCode};
use provlog_core::event::EventType;
use provlog_core::verifier::VerificationStatus;
use provlog_core::{SealMode, Sealer, Validator};
use serde_json::json;

#[test]
fn exit_codes_are_locked() {
    assert_eq!(VerificationStatus::Pass.exit_code(), 0);
    assert_eq!(VerificationStatus::Degraded.exit_code(), 1);
    assert_eq!(VerificationStatus::Fail.exit_code(), 2);
}

#[test]
fn error_codes_are_locked() {
    let expectations = [
        (IngestErrorCode::SchemaInvalid, "schema-invalid"),
        (IngestErrorCode::JcsInvalid, "jcs-invalid"),
        (IngestErrorCode::TimestampInvalid, "timestamp-invalid"),
        (IngestErrorCode::AuthorityLeak, "authority-leak"),
        (IngestErrorCode::PayloadHashMismatch, "payload-hash-mismatch"),
        (IngestErrorCode::SequenceRewind, "sequence-rewind"),
        (IngestErrorCode::SequenceGap, "sequence-gap"),
        (IngestErrorCode::LogGap, "log-gap"),
        (IngestErrorCode::InvalidFirstSequence, "invalid-first-sequence"),
        (IngestErrorCode::SessionClosed, "session-closed"),
        (IngestErrorCode::AlreadySealed, "already-sealed"),
        (IngestErrorCode::DuplicateSequence, "duplicate-sequence"),
        (IngestErrorCode::InvalidSealRequest, "invalid-seal-request"),
    ];
    for (code, wire) in expectations {
        assert_eq!(code.as_str(), wire);
    }
}

#[test]
fn error_classifications_are_locked() {
    for code in [
        IngestErrorCode::SchemaInvalid,
        IngestErrorCode::JcsInvalid,
        IngestErrorCode::TimestampInvalid,
        IngestErrorCode::AuthorityLeak,
        IngestErrorCode::PayloadHashMismatch,
        IngestErrorCode::SequenceRewind,
        IngestErrorCode::SequenceGap,
        IngestErrorCode::LogGap,
        IngestErrorCode::InvalidFirstSequence,
        IngestErrorCode::SessionClosed,
        IngestErrorCode::InvalidSealRequest,
    ] {
        assert_eq!(code.classification(), ErrorClassification::HardReject);
    }
    assert_eq!(
        IngestErrorCode::AlreadySealed.classification(),
        ErrorClassification::Conflict
    );
    assert_eq!(
        IngestErrorCode::DuplicateSequence.classification(),
        ErrorClassification::Conflict
    );
}

#[test]
fn structured_error_shape_is_locked() {
    let error = IngestError::payload_hash_mismatch("aa", "bb");
    let v = serde_json::to_value(&error).unwrap();
    assert!(v.get("error_code").is_some());
    assert!(v.get("classification").is_some());
    assert!(v.get("message").is_some());
    assert!(v.get("details").is_some());
}

#[test]
fn event_type_set_is_closed_and_locked() {
    let wire: Vec<&str> = EventType::ALL.iter().map(|t| t.as_str()).collect();
    assert_eq!(
        wire,
        vec![
            "SESSION_START",
            "SESSION_END",
            "MODEL_REQUEST",
            "MODEL_RESPONSE",
            "TOOL_CALL",
            "TOOL_RESULT",
            "AGENT_STATE_SNAPSHOT",
            "AGENT_DECISION",
            "DECISION_TRACE",
            "ERROR",
            "ANNOTATION",
            "CHAIN_SEAL",
            "LOG_DROP",
        ]
    );
}

/// Golden vectors: the seal of a fixed genesis claim. Computed independently
/// from the canonical construction (RFC 8785 bytes, SHA-256, seven signed
/// fields, null genesis predecessor).
#[test]
fn genesis_seal_matches_golden_vectors() {
    let claim = Validator::default()
        .validate(&json!({
            "event_id": "7f6c3a52-5d1a-4e9e-9c2e-1c6a0e4a3b10",
            "session_id": "b9a6d7c8-2f3e-4a5b-8c9d-0e1f2a3b4c5d",
            "sequence_number": 0,
            "timestamp_wall": "2024-05-01T12:00:00Z",
            "event_type": "SESSION_START",
            "payload": {"agent_id": "a1"},
        }))
        .unwrap();

    assert_eq!(claim.payload_canonical, r#"{"agent_id":"a1"}"#);
    assert_eq!(
        claim.payload_hash,
        "2463169dcf216dab3e9cdd328ee40451d0cb284d190050c99820fe0470477f81"
    );

    let sealed = Sealer::new("provlog-ingest-v1", SealMode::Strict)
        .seal(&claim, None)
        .unwrap()
        .event;
    assert_eq!(
        sealed.event_hash,
        "cceff5fcf049b107c7ff0fcdb78a0bebb2ba7791cafc364e0a668c7b5e6855ea"
    );
    assert!(sealed.prev_event_hash.is_none());
}

#[test]
fn session_digest_matches_golden_vector() {
    let event_hash = "cceff5fcf049b107c7ff0fcdb78a0bebb2ba7791cafc364e0a668c7b5e6855ea";
    let digest = provlog_core::hash::session_digest(
        "b9a6d7c8-2f3e-4a5b-8c9d-0e1f2a3b4c5d",
        &[event_hash],
        event_hash,
    );
    assert_eq!(
        digest,
        "99b7b4889b9a87f8ebff798e2927a436524a3f444cf272a7c2780ed65c9fac3d"
    );
}
