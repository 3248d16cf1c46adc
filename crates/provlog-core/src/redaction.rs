//! Redaction detection and companion-hash integrity.
//!
//! A value is redacted when its string is exactly `"[REDACTED]"` or `"***"`.
//! For every redacted field `k`, the same object must carry `k_hash` bound to
//! a hex string of length >= 64. Detection alone is informational; a missing
//! or malformed companion hash is an integrity violation. Whether redactions
//! are permissible at all is the caller's policy decision.

use serde_json::{Map, Value};

/// Marker strings that denote a redacted value.
pub const REDACTION_MARKERS: [&str; 2] = ["[REDACTED]", "***"];

pub fn is_redaction_marker(s: &str) -> bool {
    REDACTION_MARKERS.contains(&s)
}

/// A redacted field that was found, with its dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedField {
    pub path: String,
    pub field: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionProblem {
    MissingCompanionHash,
    MalformedCompanionHash,
}

/// A redacted field whose companion hash is absent or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionViolation {
    pub path: String,
    pub field: String,
    pub problem: RedactionProblem,
}

/// Result of scanning one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionScan {
    pub detections: Vec<RedactedField>,
    pub violations: Vec<RedactionViolation>,
}

impl RedactionScan {
    pub fn has_redactions(&self) -> bool {
        !self.detections.is_empty()
    }
}

/// Recursively scan a payload for redaction markers and check each marker's
/// companion hash.
pub fn scan_payload(payload: &Value) -> RedactionScan {
    let mut scan = RedactionScan::default();
    walk(payload, "payload", &mut scan);
    scan
}

fn walk(value: &Value, path: &str, scan: &mut RedactionScan) {
    match value {
        Value::Object(map) => walk_object(map, path, scan),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, &format!("{path}[{i}]"), scan);
            }
        }
        _ => {}
    }
}

fn walk_object(map: &Map<String, Value>, path: &str, scan: &mut RedactionScan) {
    for (key, value) in map {
        let field_path = format!("{path}.{key}");
        match value {
            Value::String(s) if is_redaction_marker(s) => {
                let hash_key = format!("{key}_hash");
                match map.get(&hash_key) {
                    None => scan.violations.push(RedactionViolation {
                        path: field_path.clone(),
                        field: key.clone(),
                        problem: RedactionProblem::MissingCompanionHash,
                    }),
                    Some(h) if !companion_hash_ok(h) => scan.violations.push(RedactionViolation {
                        path: field_path.clone(),
                        field: key.clone(),
                        problem: RedactionProblem::MalformedCompanionHash,
                    }),
                    Some(_) => {}
                }
                scan.detections.push(RedactedField {
                    path: field_path,
                    field: key.clone(),
                });
            }
            other => walk(other, &field_path, scan),
        }
    }
}

fn companion_hash_ok(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| s.len() >= 64 && s.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hex64() -> String {
        "ab".repeat(32)
    }

    #[test]
    fn clean_payload_scans_empty() {
        let scan = scan_payload(&json!({"email": "user@example.com"}));
        assert!(!scan.has_redactions());
        assert!(scan.violations.is_empty());
    }

    #[test]
    fn marker_with_companion_hash_is_detection_only() {
        let scan = scan_payload(&json!({
            "email": "[REDACTED]",
            "email_hash": hex64(),
        }));
        assert_eq!(scan.detections.len(), 1);
        assert_eq!(scan.detections[0].path, "payload.email");
        assert!(scan.violations.is_empty());
    }

    #[test]
    fn asterisk_marker_is_recognized() {
        let scan = scan_payload(&json!({"ssn": "***"}));
        assert_eq!(scan.detections.len(), 1);
        assert_eq!(
            scan.violations[0].problem,
            RedactionProblem::MissingCompanionHash
        );
    }

    #[test]
    fn missing_companion_hash_is_a_violation() {
        let scan = scan_payload(&json!({"email": "[REDACTED]"}));
        assert_eq!(scan.violations.len(), 1);
        assert_eq!(scan.violations[0].field, "email");
        assert_eq!(
            scan.violations[0].problem,
            RedactionProblem::MissingCompanionHash
        );
    }

    #[test]
    fn short_companion_hash_is_malformed() {
        let scan = scan_payload(&json!({
            "email": "[REDACTED]",
            "email_hash": "abc123",
        }));
        assert_eq!(
            scan.violations[0].problem,
            RedactionProblem::MalformedCompanionHash
        );
    }

    #[test]
    fn non_hex_companion_hash_is_malformed() {
        let scan = scan_payload(&json!({
            "email": "[REDACTED]",
            "email_hash": "z".repeat(64),
        }));
        assert_eq!(
            scan.violations[0].problem,
            RedactionProblem::MalformedCompanionHash
        );
    }

    #[test]
    fn nested_objects_and_arrays_are_walked() {
        let scan = scan_payload(&json!({
            "messages": [
                {"content": "hello"},
                {"user": {"phone": "[REDACTED]", "phone_hash": hex64()}},
            ]
        }));
        assert_eq!(scan.detections.len(), 1);
        assert_eq!(scan.detections[0].path, "payload.messages[1].user.phone");
        assert!(scan.violations.is_empty());
    }

    #[test]
    fn companion_hash_must_live_in_the_same_object() {
        let scan = scan_payload(&json!({
            "user": {"email": "[REDACTED]"},
            "email_hash": hex64(),
        }));
        assert_eq!(scan.violations.len(), 1);
    }
}
