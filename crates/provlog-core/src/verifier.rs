//! Offline verification: recomputation is what turns logging into evidence.
//!
//! The verifier consumes a canonical export, recomputes every hash in the
//! chain, and classifies the result. It runs offline, holds no state between
//! sessions, never touches the store, and never fails fast: findings
//! accumulate across the whole chain and the status is derived at the end.
//!
//! Tamper tolerance matters here, so events are inspected as raw JSON
//! values. A missing or mangled field is a finding, not a parse error.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::canonical;
use crate::hash;
use crate::redaction;

/// Final verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerificationStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "DEGRADED")]
    Degraded,
    #[serde(rename = "FAIL")]
    Fail,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Degraded => "DEGRADED",
            Self::Fail => "FAIL",
        }
    }

    /// Strict exit-code contract: 0 PASS, 1 DEGRADED, 2 FAIL.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Degraded => 1,
            Self::Fail => 2,
        }
    }
}

/// Coarse evidence grade derived from a verified chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvidenceClass {
    /// Authoritative: full chain, sealed, no drops.
    A,
    /// Degraded: verified but incomplete or unsealed.
    B,
    /// Not authoritative: integrity failure.
    C,
}

impl EvidenceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

/// Classification of individual findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FindingKind {
    #[serde(rename = "chain-break")]
    ChainBreak,
    #[serde(rename = "hash-mismatch")]
    HashMismatch,
    #[serde(rename = "payload-tamper")]
    PayloadTamper,
    #[serde(rename = "authority-invalid")]
    AuthorityInvalid,
    #[serde(rename = "sequence-violation")]
    SequenceViolation,
    #[serde(rename = "redaction-integrity-violation")]
    RedactionIntegrityViolation,
    #[serde(rename = "policy-violation")]
    PolicyViolation,
    #[serde(rename = "log-drop-detected")]
    LogDropDetected,
    #[serde(rename = "redaction-detected")]
    RedactionDetected,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChainBreak => "chain-break",
            Self::HashMismatch => "hash-mismatch",
            Self::PayloadTamper => "payload-tamper",
            Self::AuthorityInvalid => "authority-invalid",
            Self::SequenceViolation => "sequence-violation",
            Self::RedactionIntegrityViolation => "redaction-integrity-violation",
            Self::PolicyViolation => "policy-violation",
            Self::LogDropDetected => "log-drop-detected",
            Self::RedactionDetected => "redaction-detected",
        }
    }
}

/// FATAL causes FAIL, WARNING causes DEGRADED, INFO has no status effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FindingSeverity {
    #[serde(rename = "FATAL")]
    Fatal,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "INFO")]
    Info,
}

/// Individual verification finding.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: FindingSeverity,
    pub message: String,
    pub sequence_number: Option<i64>,
    pub event_id: Option<String>,
    pub details: Value,
}

impl Finding {
    fn new(kind: FindingKind, severity: FindingSeverity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            sequence_number: None,
            event_id: None,
            details: Value::Null,
        }
    }

    fn at(mut self, sequence_number: i64, event_id: Option<&str>) -> Self {
        self.sequence_number = Some(sequence_number);
        self.event_id = event_id.map(str::to_string);
        self
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Verification inputs supplied by the caller.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Authorities whose seals are accepted. An empty set rejects everything.
    pub trusted_authorities: BTreeSet<String>,
    /// Whether redacted content is permissible at all.
    pub allow_redacted: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            trusted_authorities: BTreeSet::new(),
            allow_redacted: true,
        }
    }
}

impl VerifyOptions {
    pub fn with_authorities<I, S>(authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted_authorities: authorities.into_iter().map(Into::into).collect(),
            allow_redacted: true,
        }
    }
}

/// Complete verification report.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub session_id: String,
    pub status: VerificationStatus,
    pub event_count: usize,
    pub first_event_hash: Option<String>,
    pub final_event_hash: Option<String>,
    pub chain_authority: Option<String>,
    pub verification_mode: String,
    pub sealed: bool,
    pub findings: Vec<Finding>,
}

impl VerificationReport {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn has_log_drops(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.kind == FindingKind::LogDropDetected)
    }

    /// Evidence class is a deterministic function of status, drops, and seal.
    pub fn evidence_class(&self) -> EvidenceClass {
        match self.status {
            VerificationStatus::Fail => EvidenceClass::C,
            VerificationStatus::Degraded => EvidenceClass::B,
            VerificationStatus::Pass => {
                if self.has_log_drops() || !self.sealed {
                    EvidenceClass::B
                } else {
                    EvidenceClass::A
                }
            }
        }
    }

    pub fn evidence_class_rationale(&self) -> String {
        match self.evidence_class() {
            EvidenceClass::A => "Full chain, sealed, no gaps, no drops, trusted authority".into(),
            EvidenceClass::B => {
                let drops = self
                    .findings
                    .iter()
                    .filter(|f| f.kind == FindingKind::LogDropDetected)
                    .count();
                if drops > 0 {
                    format!("Verified but {drops} LOG_DROP event(s) detected")
                } else if !self.sealed {
                    "Verified but the session carries no seal".into()
                } else {
                    "Verified but degraded (incomplete evidence)".into()
                }
            }
            EvidenceClass::C => {
                let fatal = self
                    .findings
                    .iter()
                    .filter(|f| f.severity == FindingSeverity::Fatal)
                    .count();
                format!("Integrity failure: {fatal} fatal finding(s)")
            }
        }
    }

    /// Full report as a JSON document, including the derived fields.
    pub fn to_json(&self) -> Value {
        let mut v = serde_json::to_value(self).expect("report serializes");
        v["evidence_class"] = json!(self.evidence_class().as_str());
        v["evidence_class_rationale"] = json!(self.evidence_class_rationale());
        v["exit_code"] = json!(self.exit_code());
        v
    }
}

/// Verify the integrity and continuity of one exported session.
///
/// `seal` is the export's optional seal block; its digest is cross-checked
/// against the recomputed event hashes when present.
pub fn verify_session(
    events: &[Value],
    seal: Option<&Value>,
    opts: &VerifyOptions,
) -> VerificationReport {
    let mut findings: Vec<Finding> = Vec::new();

    if events.is_empty() {
        findings.push(Finding::new(
            FindingKind::ChainBreak,
            FindingSeverity::Fatal,
            "Empty session - no events to verify",
        ));
        return VerificationReport {
            session_id: "UNKNOWN".into(),
            status: VerificationStatus::Fail,
            event_count: 0,
            first_event_hash: None,
            final_event_hash: None,
            chain_authority: None,
            verification_mode: "UNKNOWN".into(),
            sealed: seal.is_some(),
            findings,
        };
    }

    let session_id = events[0]
        .get("session_id")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string();
    let mut chain_authority: Option<String> = None;
    let mut verification_mode = "FULL".to_string();

    let mut recomputed_hashes: Vec<String> = Vec::with_capacity(events.len());
    let mut prev_expected_hash: Option<String> = None;

    for (i, event) in events.iter().enumerate() {
        let seq = event
            .get("sequence_number")
            .and_then(Value::as_i64)
            .unwrap_or(-1);
        let event_id = event.get("event_id").and_then(Value::as_str);

        // 1. Sequence continuity: position in the export is the contract.
        if seq != i as i64 {
            findings.push(
                Finding::new(
                    FindingKind::SequenceViolation,
                    FindingSeverity::Fatal,
                    format!("Expected sequence {i}, got {seq}"),
                )
                .at(seq, event_id),
            );
        }

        // 2. Session consistency.
        let event_session = event.get("session_id").and_then(Value::as_str);
        if event_session != Some(session_id.as_str()) {
            findings.push(
                Finding::new(
                    FindingKind::ChainBreak,
                    FindingSeverity::Fatal,
                    format!("Session ID mismatch at seq {seq}"),
                )
                .at(seq, event_id)
                .with_details(json!({"expected": session_id, "got": event_session})),
            );
        }

        // 3. Authority lineage.
        let authority = event.get("chain_authority").and_then(Value::as_str);
        match authority {
            Some(a) if opts.trusted_authorities.contains(a) => {
                chain_authority = Some(a.to_string());
            }
            _ => {
                findings.push(
                    Finding::new(
                        FindingKind::AuthorityInvalid,
                        FindingSeverity::Fatal,
                        format!("Unknown authority: {}", authority.unwrap_or("<absent>")),
                    )
                    .at(seq, event_id),
                );
            }
        }

        // 4. Chain linkage. Compared against the recomputed predecessor hash,
        // never the claimed one, so tampering cannot propagate silently.
        let recorded_prev = event.get("prev_event_hash").and_then(Value::as_str);
        if prev_expected_hash.as_deref() != recorded_prev {
            findings.push(
                Finding::new(
                    FindingKind::ChainBreak,
                    FindingSeverity::Fatal,
                    format!("Chain break at seq {seq}: prev_event_hash mismatch"),
                )
                .at(seq, event_id)
                .with_details(json!({
                    "expected": &prev_expected_hash,
                    "recorded": recorded_prev,
                })),
            );
        }

        // 5. Payload hash recomputation.
        let payload = event.get("payload").cloned().unwrap_or_else(|| json!({}));
        let recorded_payload_hash = event.get("payload_hash").and_then(Value::as_str);
        match hash::payload_digest(&payload) {
            Ok(computed) => {
                if Some(computed.as_str()) != recorded_payload_hash {
                    findings.push(
                        Finding::new(
                            FindingKind::PayloadTamper,
                            FindingSeverity::Fatal,
                            format!("Payload hash mismatch at seq {seq}"),
                        )
                        .at(seq, event_id)
                        .with_details(json!({
                            "computed": computed,
                            "recorded": recorded_payload_hash,
                        })),
                    );
                }
            }
            Err(e) => {
                findings.push(
                    Finding::new(
                        FindingKind::PayloadTamper,
                        FindingSeverity::Fatal,
                        format!("Cannot canonicalize payload at seq {seq}: {e}"),
                    )
                    .at(seq, event_id),
                );
            }
        }

        // 6. Event hash recomputation over the signed envelope, using the
        // recorded field values verbatim.
        let signed = json!({
            "event_id": event.get("event_id").cloned().unwrap_or(Value::Null),
            "session_id": event.get("session_id").cloned().unwrap_or(Value::Null),
            "sequence_number": event.get("sequence_number").cloned().unwrap_or(Value::Null),
            "timestamp_wall": event.get("timestamp_wall").cloned().unwrap_or(Value::Null),
            "event_type": event.get("event_type").cloned().unwrap_or(Value::Null),
            "payload_hash": event.get("payload_hash").cloned().unwrap_or(Value::Null),
            "prev_event_hash": event.get("prev_event_hash").cloned().unwrap_or(Value::Null),
        });
        let recorded_event_hash = event.get("event_hash").and_then(Value::as_str);
        let computed_event_hash = match canonical::to_canonical_bytes(&signed) {
            Ok(bytes) => {
                let computed = hash::sha256_hex(&bytes);
                if Some(computed.as_str()) != recorded_event_hash {
                    findings.push(
                        Finding::new(
                            FindingKind::HashMismatch,
                            FindingSeverity::Fatal,
                            format!("Event hash mismatch at seq {seq}"),
                        )
                        .at(seq, event_id)
                        .with_details(json!({
                            "computed": computed.clone(),
                            "recorded": recorded_event_hash,
                        })),
                    );
                }
                Some(computed)
            }
            Err(e) => {
                findings.push(
                    Finding::new(
                        FindingKind::HashMismatch,
                        FindingSeverity::Fatal,
                        format!("Cannot compute event hash at seq {seq}: {e}"),
                    )
                    .at(seq, event_id),
                );
                None
            }
        };

        // 7. Drops degrade the evidence.
        if event.get("event_type").and_then(Value::as_str) == Some("LOG_DROP") {
            findings.push(
                Finding::new(
                    FindingKind::LogDropDetected,
                    FindingSeverity::Warning,
                    format!("LOG_DROP at seq {seq}: evidence incomplete"),
                )
                .at(seq, event_id)
                .with_details(payload.clone()),
            );
            verification_mode = "DEGRADED".to_string();
        }

        // 8. Redaction: structural integrity plus the caller's policy choice.
        let scan = redaction::scan_payload(&payload);
        for violation in &scan.violations {
            findings.push(
                Finding::new(
                    FindingKind::RedactionIntegrityViolation,
                    FindingSeverity::Fatal,
                    format!(
                        "Redaction integrity failure for field '{}' at seq {seq}",
                        violation.field
                    ),
                )
                .at(seq, event_id)
                .with_details(json!({"path": violation.path, "field": violation.field})),
            );
        }
        for detection in &scan.detections {
            findings.push(
                Finding::new(
                    FindingKind::RedactionDetected,
                    FindingSeverity::Info,
                    format!("Redacted content found in field '{}'", detection.field),
                )
                .at(seq, event_id)
                .with_details(json!({"path": detection.path})),
            );
        }
        if scan.has_redactions() {
            if opts.allow_redacted {
                verification_mode = "REDACTED".to_string();
            } else {
                findings.push(
                    Finding::new(
                        FindingKind::PolicyViolation,
                        FindingSeverity::Fatal,
                        format!("Redacted content forbidden at seq {seq}"),
                    )
                    .at(seq, event_id),
                );
            }
        }

        // Chain tracking continues from the recomputed hash; fall back to the
        // recorded one only when recomputation itself was impossible.
        let next = computed_event_hash
            .or_else(|| recorded_event_hash.map(str::to_string))
            .unwrap_or_default();
        recomputed_hashes.push(next.clone());
        prev_expected_hash = Some(next);
    }

    // Seal cross-check: the digest must match the recomputed chain.
    if let Some(seal) = seal {
        verify_seal(seal, &session_id, &recomputed_hashes, &mut findings);
    }

    let fatal = findings
        .iter()
        .any(|f| f.severity == FindingSeverity::Fatal);
    let warning = findings
        .iter()
        .any(|f| f.severity == FindingSeverity::Warning);
    let status = if fatal {
        VerificationStatus::Fail
    } else if warning {
        VerificationStatus::Degraded
    } else {
        VerificationStatus::Pass
    };

    VerificationReport {
        session_id,
        status,
        event_count: events.len(),
        first_event_hash: recomputed_hashes.first().cloned(),
        final_event_hash: recomputed_hashes.last().cloned(),
        chain_authority,
        verification_mode,
        sealed: seal.is_some(),
        findings,
    }
}

fn verify_seal(
    seal: &Value,
    session_id: &str,
    recomputed_hashes: &[String],
    findings: &mut Vec<Finding>,
) {
    let final_hash = recomputed_hashes.last().map(String::as_str).unwrap_or("");
    let expected_digest = hash::session_digest(session_id, recomputed_hashes, final_hash);

    if let Some(recorded) = seal.get("session_digest").and_then(Value::as_str) {
        if recorded != expected_digest {
            findings.push(
                Finding::new(
                    FindingKind::HashMismatch,
                    FindingSeverity::Fatal,
                    "Seal digest does not match the recomputed chain",
                )
                .with_details(json!({
                    "computed": expected_digest,
                    "recorded": recorded,
                })),
            );
        }
    }
    if let Some(recorded_final) = seal.get("final_event_hash").and_then(Value::as_str) {
        if recorded_final != final_hash {
            findings.push(
                Finding::new(
                    FindingKind::HashMismatch,
                    FindingSeverity::Fatal,
                    "Seal final_event_hash does not match the recomputed chain",
                )
                .with_details(json!({"computed": final_hash, "recorded": recorded_final})),
            );
        }
    }
    if let Some(count) = seal.get("event_count").and_then(Value::as_u64) {
        if count as usize != recomputed_hashes.len() {
            findings.push(
                Finding::new(
                    FindingKind::HashMismatch,
                    FindingSeverity::Fatal,
                    "Seal event_count does not match the export",
                )
                .with_details(json!({
                    "computed": recomputed_hashes.len(),
                    "recorded": count,
                })),
            );
        }
    }
}

/// Strict ingestion-side classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionClassification {
    #[serde(rename = "AUTHORITATIVE_EVIDENCE")]
    AuthoritativeEvidence,
    #[serde(rename = "NON_AUTHORITATIVE_EVIDENCE")]
    NonAuthoritativeEvidence,
}

impl SessionClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthoritativeEvidence => "AUTHORITATIVE_EVIDENCE",
            Self::NonAuthoritativeEvidence => "NON_AUTHORITATIVE_EVIDENCE",
        }
    }
}

/// Authoritative iff the chain verifies under a trusted authority, the
/// session is sealed, no events were dropped, and a SESSION_END is present.
pub fn classify_session(
    events: &[Value],
    seal: Option<&Value>,
    opts: &VerifyOptions,
) -> SessionClassification {
    let report = verify_session(events, seal, opts);
    let has_session_end = events
        .iter()
        .any(|e| e.get("event_type").and_then(Value::as_str) == Some("SESSION_END"));

    let authoritative = report.status != VerificationStatus::Fail
        && seal.is_some()
        && !report.has_log_drops()
        && has_session_end;

    if authoritative {
        SessionClassification::AuthoritativeEvidence
    } else {
        SessionClassification::NonAuthoritativeEvidence
    }
}
