//! # Provlog Core
//!
//! Pure core of the provlog evidence pipeline: tamper-evident, hash-chained
//! logs of AI-agent activity that a third party can re-verify offline.
//!
//! ## Key Types
//!
//! - [`ValidatedClaim`] - a producer's assertion after the ingress gate
//! - [`SealedEvent`] - the atomic unit of evidence; only the [`Sealer`]
//!   constructs it
//! - [`VerificationReport`] - offline recomputation of a full session chain
//! - [`PolicyEngine`] - deterministic policy evaluation over committed events
//!
//! ## Quick Start
//!
//! ```rust
//! use provlog_core::{Sealer, SealMode, Validator};
//! use serde_json::json;
//!
//! let validator = Validator::default();
//! let claim = validator
//!     .validate(&json!({
//!         "event_id": "7f6c3a52-5d1a-4e9e-9c2e-1c6a0e4a3b10",
//!         "session_id": "b9a6d7c8-2f3e-4a5b-8c9d-0e1f2a3b4c5d",
//!         "sequence_number": 0,
//!         "timestamp_wall": "2024-05-01T12:00:00Z",
//!         "event_type": "SESSION_START",
//!         "payload": {"agent_id": "a1"}
//!     }))
//!     .unwrap();
//!
//! let sealer = Sealer::new("provlog-ingest-v1", SealMode::Strict);
//! let sealed = sealer.seal(&claim, None).unwrap().event;
//! assert!(sealed.prev_event_hash.is_none());
//! ```
//!
//! Everything in this crate is free of I/O. Persistence, queues, and the CLI
//! live in the sibling crates and compose these types under any transport.

pub mod canonical;
pub mod error;
pub mod event;
pub mod export;
pub mod hash;
pub mod policy;
pub mod redaction;
pub mod replay;
pub mod sealer;
pub mod validator;
pub mod verifier;

pub use canonical::{to_canonical_bytes, to_canonical_string, CanonicalError};
pub use error::{ErrorClassification, IngestError, IngestErrorCode};
pub use event::{ChainSeal, ChainState, EventType, SealedEvent, ValidatedClaim};
pub use export::{ExportDocument, ExportError, SessionExport};
pub use policy::{
    CanonicalEvent, Policy, PolicyConfig, PolicyEngine, PolicyError, PolicySet, ViolationRecord,
    ViolationSeverity,
};
pub use redaction::{RedactionScan, RedactionViolation};
pub use replay::{FrameType, ReplayFailure, ReplayFrame, ReplayResult, ReplayWarning};
pub use sealer::{SealMode, SealOutcome, Sealer, DEFAULT_CHAIN_AUTHORITY};
pub use validator::Validator;
pub use verifier::{
    verify_session, EvidenceClass, Finding, FindingKind, FindingSeverity, SessionClassification,
    VerificationReport, VerificationStatus, VerifyOptions,
};
