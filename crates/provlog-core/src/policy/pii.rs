//! PII heuristic policy.
//!
//! Regex scan over payload strings for common PII shapes. Heuristic, not
//! certification: matches are warnings and every description says so.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

use super::engine::{
    CanonicalEvent, Policy, PolicyContext, PolicyError, ViolationRecord, ViolationSeverity,
};

const SOURCE: &str = include_str!("pii.rs");

static PII_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "email",
            Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap(),
        ),
        ("phone", Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap()),
        ("ssn", Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        (
            "credit_card",
            Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap(),
        ),
        (
            "ip_address",
            Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap(),
        ),
    ]
});

pub struct PiiHeuristicPolicy;

impl Policy for PiiHeuristicPolicy {
    fn name(&self) -> &'static str {
        "pii_heuristic"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn source_text(&self) -> &'static str {
        SOURCE
    }

    fn evaluate(
        &self,
        events: &[CanonicalEvent],
        ctx: &PolicyContext,
    ) -> Result<Vec<ViolationRecord>, PolicyError> {
        let mut violations = Vec::new();

        for event in events {
            // Fall back to scanning the raw canonical text if it somehow
            // fails to parse; the scan still works on a flat string.
            match serde_json::from_str::<Value>(&event.payload_canonical) {
                Ok(payload) => scan_value(&payload, "payload", event, ctx, &mut violations),
                Err(_) => scan_string(
                    &event.payload_canonical,
                    "payload",
                    event,
                    ctx,
                    &mut violations,
                ),
            }
        }

        Ok(violations)
    }
}

fn scan_value(
    value: &Value,
    path: &str,
    event: &CanonicalEvent,
    ctx: &PolicyContext,
    violations: &mut Vec<ViolationRecord>,
) {
    match value {
        Value::String(s) => {
            // Redacted markers are the redaction policy's concern.
            if !crate::redaction::is_redaction_marker(s) {
                scan_string(s, path, event, ctx, violations);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_value(item, &format!("{path}[{i}]"), event, ctx, violations);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                scan_value(v, &format!("{path}.{k}"), event, ctx, violations);
            }
        }
        _ => {}
    }
}

fn scan_string(
    text: &str,
    path: &str,
    event: &CanonicalEvent,
    ctx: &PolicyContext,
    violations: &mut Vec<ViolationRecord>,
) {
    for (kind, pattern) in PII_PATTERNS.iter() {
        if pattern.is_match(text) {
            violations.push(ViolationRecord {
                session_id: event.session_id,
                event_id: event.event_id,
                event_sequence_number: event.sequence_number,
                policy_name: "pii_heuristic".to_string(),
                policy_version: ctx.policy_version.clone(),
                policy_hash: ctx.policy_hash.clone(),
                severity: ViolationSeverity::Warning,
                description: format!(
                    "Possible {kind} detected in field '{path}' (heuristic, not certification)"
                ),
                // The matched text is deliberately not echoed back.
                metadata: json!({
                    "field_path": path,
                    "pattern": kind,
                    "check_type": "pii_heuristic",
                }),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use uuid::Uuid;

    fn event(payload: Value) -> CanonicalEvent {
        let payload_canonical = crate::canonical::to_canonical_string(&payload).unwrap();
        CanonicalEvent {
            event_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            sequence_number: 1,
            event_type: EventType::ModelResponse,
            payload_hash: crate::hash::sha256_hex(payload_canonical.as_bytes()),
            payload_canonical,
            event_hash: "0".repeat(64),
            chain_authority: "provlog-ingest-v1".into(),
        }
    }

    fn ctx() -> PolicyContext {
        PolicyContext {
            policy_version: "1.0.0".into(),
            policy_hash: "f".repeat(64),
        }
    }

    #[test]
    fn email_address_warns_and_states_heuristic() {
        let violations = PiiHeuristicPolicy
            .evaluate(&[event(json!({"text": "reach me at user@example.com"}))], &ctx())
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, ViolationSeverity::Warning);
        assert!(violations[0].description.contains("heuristic, not certification"));
        assert_eq!(violations[0].metadata["pattern"], "email");
    }

    #[test]
    fn matched_text_is_not_echoed() {
        let violations = PiiHeuristicPolicy
            .evaluate(&[event(json!({"ssn": "123-45-6789"}))], &ctx())
            .unwrap();
        let serialized = serde_json::to_string(&violations).unwrap();
        assert!(!serialized.contains("123-45-6789"));
    }

    #[test]
    fn ssn_and_credit_card_shapes_match() {
        let violations = PiiHeuristicPolicy
            .evaluate(
                &[event(json!({
                    "a": "123-45-6789",
                    "b": "4111 1111 1111 1111",
                }))],
                &ctx(),
            )
            .unwrap();
        let kinds: Vec<_> = violations
            .iter()
            .map(|v| v.metadata["pattern"].as_str().unwrap().to_string())
            .collect();
        assert!(kinds.contains(&"ssn".to_string()));
        assert!(kinds.contains(&"credit_card".to_string()));
    }

    #[test]
    fn clean_payload_is_quiet() {
        let violations = PiiHeuristicPolicy
            .evaluate(&[event(json!({"text": "the answer is 42"}))], &ctx())
            .unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn redaction_markers_are_skipped() {
        let violations = PiiHeuristicPolicy
            .evaluate(
                &[event(json!({"email": "[REDACTED]", "email_hash": "ab".repeat(32)}))],
                &ctx(),
            )
            .unwrap();
        assert!(violations.is_empty());
    }
}
