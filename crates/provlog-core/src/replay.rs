//! Replay projection: a verified chain becomes an ordered stream of frames.
//!
//! Invariants:
//! - Replay consumes verified chains only. If verification fails there are
//!   no frames, no partial data, no metadata: an explicit [`ReplayFailure`].
//! - Single origin: every frame derives from exactly one committed event or
//!   one detected structural absence. Nothing is synthesized or reordered.
//! - Frames follow strict sequence order. Timestamp anomalies become
//!   warnings, never reorderings.

use serde::Serialize;
use serde_json::Value;

use crate::canonical;
use crate::redaction;
use crate::verifier::{self, FindingSeverity, VerificationStatus, VerifyOptions};

/// What a frame is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameType {
    #[serde(rename = "EVENT")]
    Event,
    #[serde(rename = "GAP")]
    Gap,
    #[serde(rename = "LOG_DROP")]
    LogDrop,
    #[serde(rename = "REDACTION")]
    Redaction,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "EVENT",
            Self::Gap => "GAP",
            Self::LogDrop => "LOG_DROP",
            Self::Redaction => "REDACTION",
        }
    }
}

/// One unit of the projection.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayFrame {
    pub frame_type: FrameType,
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Canonical payload bytes, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_end: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub redacted_fields: Vec<String>,
}

impl ReplayFrame {
    fn gap(position: usize, gap_start: u64, gap_end: u64) -> Self {
        Self {
            frame_type: FrameType::Gap,
            position,
            sequence_number: None,
            timestamp: None,
            event_type: None,
            payload: None,
            event_hash: None,
            gap_start: Some(gap_start),
            gap_end: Some(gap_end),
            dropped_count: None,
            drop_reason: None,
            redacted_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningCode {
    #[serde(rename = "sequence-gap")]
    SequenceGap,
    #[serde(rename = "timestamp-anomaly")]
    TimestampAnomaly,
    #[serde(rename = "events-dropped")]
    EventsDropped,
    #[serde(rename = "chain-not-sealed")]
    ChainNotSealed,
    #[serde(rename = "partial-evidence")]
    PartialEvidence,
}

/// Non-fatal observation attached to the projection.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayWarning {
    pub code: WarningCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl ReplayWarning {
    fn sequence_gap(gap_start: u64, gap_end: u64, position: usize) -> Self {
        Self {
            code: WarningCode::SequenceGap,
            message: format!("Sequence gap: events {gap_start}..={gap_end} are absent"),
            position: Some(position),
        }
    }

    fn timestamp_anomaly(position: usize) -> Self {
        Self {
            code: WarningCode::TimestampAnomaly,
            message: "Wall-clock timestamp is earlier than its predecessor".into(),
            position: Some(position),
        }
    }

    fn events_dropped(count: u64, reason: &str, position: usize) -> Self {
        Self {
            code: WarningCode::EventsDropped,
            message: format!("{count} event(s) dropped: {reason}"),
            position: Some(position),
        }
    }

    fn chain_not_sealed() -> Self {
        Self {
            code: WarningCode::ChainNotSealed,
            message: "Chain carries no seal".into(),
            position: None,
        }
    }

    fn partial_evidence() -> Self {
        Self {
            code: WarningCode::PartialEvidence,
            message: "Evidence is not class A; treat as incomplete".into(),
            position: None,
        }
    }
}

/// Explicit refusal. Carries no frames, no metadata, no partial output.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayFailure {
    pub session_id: String,
    pub error_code: String,
    pub error_message: String,
}

/// Complete projection of one verified session.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    pub session_id: String,
    pub evidence_class: String,
    pub seal_present: bool,
    pub frames: Vec<ReplayFrame>,
    pub warnings: Vec<ReplayWarning>,
    pub event_count: usize,
    pub total_drops: u64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub final_hash: Option<String>,
}

/// Verify, then project. Refuses on verification failure.
///
/// One relaxation against the offline verifier: a chain produced by a
/// non-strict ingester carries committed sequence gaps, which the verifier
/// reports as index mismatches. When those are the only fatal findings and
/// the sequences are still strictly increasing, the chain replays with its
/// gaps surfaced as GAP frames. Any other fatal finding refuses.
pub fn build_replay(
    events: &[Value],
    seal: Option<&Value>,
    opts: &VerifyOptions,
) -> Result<ReplayResult, ReplayFailure> {
    let report = verifier::verify_session(events, seal, opts);

    let mut gapped_chain = false;
    if report.status == VerificationStatus::Fail {
        let only_sequence_findings = report
            .findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Fatal)
            .all(|f| f.kind == verifier::FindingKind::SequenceViolation);

        if only_sequence_findings && strictly_increasing(events) {
            gapped_chain = true;
        } else {
            let first_fatal = report
                .findings
                .iter()
                .find(|f| f.severity == FindingSeverity::Fatal);
            return Err(ReplayFailure {
                session_id: report.session_id,
                error_code: first_fatal
                    .map(|f| f.kind.as_str().to_string())
                    .unwrap_or_else(|| "chain-break".into()),
                error_message: first_fatal
                    .map(|f| f.message.clone())
                    .unwrap_or_else(|| "Verification failed".into()),
            });
        }
    }

    let mut frames: Vec<ReplayFrame> = Vec::with_capacity(events.len());
    let mut warnings: Vec<ReplayWarning> = Vec::new();
    let mut total_drops: u64 = 0;
    let mut prev_seq: Option<u64> = None;
    let mut prev_timestamp: Option<chrono::DateTime<chrono::FixedOffset>> = None;
    let mut position: usize = 0;

    for event in events {
        let seq = event
            .get("sequence_number")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let event_type = event
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let timestamp = event
            .get("timestamp_wall")
            .and_then(Value::as_str)
            .map(str::to_string);
        let event_hash = event
            .get("event_hash")
            .and_then(Value::as_str)
            .map(str::to_string);

        // Structural absence: the committed chain jumped. Only a non-strict
        // ingester can produce this.
        if let Some(prev) = prev_seq {
            if seq > prev + 1 {
                let gap_start = prev + 1;
                let gap_end = seq - 1;
                frames.push(ReplayFrame::gap(position, gap_start, gap_end));
                warnings.push(ReplayWarning::sequence_gap(gap_start, gap_end, position));
                position += 1;
            }
        }

        let parsed_ts = timestamp
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok());
        if let (Some(prev_ts), Some(ts)) = (prev_timestamp, parsed_ts) {
            if ts < prev_ts {
                warnings.push(ReplayWarning::timestamp_anomaly(position));
            }
        }

        // The export carries the payload object; the frame carries its
        // canonical bytes verbatim.
        let payload_value = event.get("payload").cloned().unwrap_or(Value::Null);
        let payload_canonical = canonical::to_canonical_string(&payload_value).ok();

        if event_type == "LOG_DROP" {
            let dropped_count = payload_value
                .get("dropped_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let drop_reason = payload_value
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string();

            frames.push(ReplayFrame {
                frame_type: FrameType::LogDrop,
                position,
                sequence_number: Some(seq),
                timestamp: timestamp.clone(),
                event_type: Some(event_type),
                payload: payload_canonical,
                event_hash,
                gap_start: None,
                gap_end: None,
                dropped_count: Some(dropped_count),
                drop_reason: Some(drop_reason.clone()),
                redacted_fields: Vec::new(),
            });
            warnings.push(ReplayWarning::events_dropped(
                dropped_count,
                &drop_reason,
                position,
            ));
            total_drops += dropped_count;
            position += 1;
        } else {
            frames.push(ReplayFrame {
                frame_type: FrameType::Event,
                position,
                sequence_number: Some(seq),
                timestamp: timestamp.clone(),
                event_type: Some(event_type),
                payload: payload_canonical,
                event_hash: event_hash.clone(),
                gap_start: None,
                gap_end: None,
                dropped_count: None,
                drop_reason: None,
                redacted_fields: Vec::new(),
            });
            position += 1;

            // Redaction annotation, derived from the same committed event.
            let scan = redaction::scan_payload(&payload_value);
            if scan.has_redactions() {
                frames.push(ReplayFrame {
                    frame_type: FrameType::Redaction,
                    position,
                    sequence_number: Some(seq),
                    timestamp: None,
                    event_type: None,
                    payload: None,
                    event_hash,
                    gap_start: None,
                    gap_end: None,
                    dropped_count: None,
                    drop_reason: None,
                    redacted_fields: scan.detections.into_iter().map(|d| d.path).collect(),
                });
                position += 1;
            }
        }

        prev_seq = Some(seq);
        if parsed_ts.is_some() {
            prev_timestamp = parsed_ts;
        }
    }

    // A gapped chain is incomplete evidence regardless of its hash validity.
    let evidence_class = if gapped_chain {
        verifier::EvidenceClass::B
    } else {
        report.evidence_class()
    };
    if seal.is_none() {
        warnings.push(ReplayWarning::chain_not_sealed());
    }
    if evidence_class != verifier::EvidenceClass::A {
        warnings.push(ReplayWarning::partial_evidence());
    }

    let first_timestamp = events
        .first()
        .and_then(|e| e.get("timestamp_wall"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let last_timestamp = events
        .last()
        .and_then(|e| e.get("timestamp_wall"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ReplayResult {
        session_id: report.session_id,
        evidence_class: evidence_class.as_str().to_string(),
        seal_present: seal.is_some(),
        frames,
        warnings,
        event_count: events.len(),
        total_drops,
        first_timestamp,
        last_timestamp,
        final_hash: report.final_event_hash,
    })
}

fn strictly_increasing(events: &[Value]) -> bool {
    let mut prev: Option<u64> = None;
    for event in events {
        let Some(seq) = event.get("sequence_number").and_then(Value::as_u64) else {
            return false;
        };
        if let Some(p) = prev {
            if seq <= p {
                return false;
            }
        }
        prev = Some(seq);
    }
    true
}
