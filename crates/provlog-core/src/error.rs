//! Machine-readable ingestion error taxonomy.
//!
//! Errors are contracts, not strings: the kebab-case codes below are the wire
//! form, and every rejection carries a classification that drives transport
//! behavior (hard-reject vs. conflict). Producers receive the structured
//! [`IngestError`] object; internal stack context stays server-side.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

/// How a rejection is classified at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// Malformed or forbidden input. Retrying the same request cannot succeed.
    #[serde(rename = "hard-reject")]
    HardReject,
    /// Idempotency or state conflict. The request raced committed state.
    #[serde(rename = "conflict")]
    Conflict,
}

impl ErrorClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HardReject => "hard-reject",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire codes for ingestion rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestErrorCode {
    #[serde(rename = "schema-invalid")]
    SchemaInvalid,
    #[serde(rename = "jcs-invalid")]
    JcsInvalid,
    #[serde(rename = "timestamp-invalid")]
    TimestampInvalid,
    #[serde(rename = "authority-leak")]
    AuthorityLeak,
    #[serde(rename = "payload-hash-mismatch")]
    PayloadHashMismatch,
    #[serde(rename = "sequence-rewind")]
    SequenceRewind,
    #[serde(rename = "sequence-gap")]
    SequenceGap,
    #[serde(rename = "log-gap")]
    LogGap,
    #[serde(rename = "invalid-first-sequence")]
    InvalidFirstSequence,
    #[serde(rename = "session-closed")]
    SessionClosed,
    #[serde(rename = "already-sealed")]
    AlreadySealed,
    #[serde(rename = "duplicate-sequence")]
    DuplicateSequence,
    #[serde(rename = "invalid-seal-request")]
    InvalidSealRequest,
}

impl IngestErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaInvalid => "schema-invalid",
            Self::JcsInvalid => "jcs-invalid",
            Self::TimestampInvalid => "timestamp-invalid",
            Self::AuthorityLeak => "authority-leak",
            Self::PayloadHashMismatch => "payload-hash-mismatch",
            Self::SequenceRewind => "sequence-rewind",
            Self::SequenceGap => "sequence-gap",
            Self::LogGap => "log-gap",
            Self::InvalidFirstSequence => "invalid-first-sequence",
            Self::SessionClosed => "session-closed",
            Self::AlreadySealed => "already-sealed",
            Self::DuplicateSequence => "duplicate-sequence",
            Self::InvalidSealRequest => "invalid-seal-request",
        }
    }

    /// Classification is a fixed property of the code.
    pub fn classification(&self) -> ErrorClassification {
        match self {
            Self::AlreadySealed | Self::DuplicateSequence => ErrorClassification::Conflict,
            _ => ErrorClassification::HardReject,
        }
    }
}

impl fmt::Display for IngestErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured rejection returned to producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{error_code}: {message}")]
pub struct IngestError {
    pub error_code: IngestErrorCode,
    pub classification: ErrorClassification,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl IngestError {
    pub fn new(code: IngestErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            error_code: code,
            classification: code.classification(),
            message: message.into(),
            details,
        }
    }

    pub fn schema_invalid(details: Value) -> Self {
        Self::new(IngestErrorCode::SchemaInvalid, "schema violation", details)
    }

    pub fn jcs_invalid(details: Value) -> Self {
        Self::new(
            IngestErrorCode::JcsInvalid,
            "payload cannot be canonicalized (RFC 8785)",
            details,
        )
    }

    pub fn timestamp_invalid(received: &str, reason: &str) -> Self {
        Self::new(
            IngestErrorCode::TimestampInvalid,
            "malformed or timezone-less timestamp",
            json!({"received": received, "error": reason}),
        )
    }

    pub fn authority_leak() -> Self {
        Self::new(
            IngestErrorCode::AuthorityLeak,
            "client attempted to assert authority (event_hash or chain_authority present)",
            json!({}),
        )
    }

    pub fn payload_hash_mismatch(expected: &str, received: &str) -> Self {
        Self::new(
            IngestErrorCode::PayloadHashMismatch,
            "client-provided payload_hash does not match recomputed hash",
            json!({"expected": expected, "received": received}),
        )
    }

    pub fn sequence_rewind(last_sequence: u64, received: u64) -> Self {
        Self::new(
            IngestErrorCode::SequenceRewind,
            "sequence_number is not greater than the last accepted sequence",
            json!({"last_sequence": last_sequence, "received_sequence": received}),
        )
    }

    pub fn sequence_gap(expected: u64, received: u64) -> Self {
        Self::new(
            IngestErrorCode::SequenceGap,
            "batch does not extend the committed chain contiguously",
            json!({"expected_sequence": expected, "received_sequence": received}),
        )
    }

    pub fn log_gap(expected: u64, received: u64) -> Self {
        Self::new(
            IngestErrorCode::LogGap,
            "sequence gap detected",
            json!({"expected_sequence": expected, "received_sequence": received}),
        )
    }

    pub fn invalid_first_sequence(received: u64) -> Self {
        Self::new(
            IngestErrorCode::InvalidFirstSequence,
            "first event of a session must have sequence_number 0",
            json!({"received_sequence": received}),
        )
    }

    pub fn session_closed(session_id: Uuid) -> Self {
        Self::new(
            IngestErrorCode::SessionClosed,
            "session is closed; no backfill allowed",
            json!({"session_id": session_id}),
        )
    }

    pub fn already_sealed(session_id: Uuid) -> Self {
        Self::new(
            IngestErrorCode::AlreadySealed,
            "session is sealed; sealed sessions cannot accept new events",
            json!({"session_id": session_id}),
        )
    }

    pub fn duplicate_sequence(session_id: Uuid, sequence_number: u64) -> Self {
        Self::new(
            IngestErrorCode::DuplicateSequence,
            "an event with this (session_id, sequence_number) is already committed",
            json!({"session_id": session_id, "sequence_number": sequence_number}),
        )
    }

    pub fn invalid_seal_request(reason: &str) -> Self {
        Self::new(
            IngestErrorCode::InvalidSealRequest,
            "seal requested without a terminating SESSION_END",
            json!({"error": reason}),
        )
    }
}
