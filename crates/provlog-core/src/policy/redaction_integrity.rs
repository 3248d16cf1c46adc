//! Redaction integrity policy.
//!
//! Every `[REDACTED]` value inside a committed payload must carry a sibling
//! `<field>_hash` bound to a hex string of length >= 64. Structural check
//! only; whether redaction is permitted at all is a verifier concern.

use serde_json::json;

use crate::redaction::{self, RedactionProblem};

use super::engine::{
    CanonicalEvent, Policy, PolicyContext, PolicyError, ViolationRecord, ViolationSeverity,
};

const SOURCE: &str = include_str!("redaction_integrity.rs");

pub struct RedactionIntegrityPolicy;

impl Policy for RedactionIntegrityPolicy {
    fn name(&self) -> &'static str {
        "redaction_integrity"
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
            // Committed payloads are canonical JSON by construction; a parse
            // failure here is corrupt evidence and must fail the batch.
            let payload: serde_json::Value = serde_json::from_str(&event.payload_canonical)
                .map_err(|e| PolicyError::Evaluation {
                    policy: self.name().to_string(),
                    message: format!(
                        "unparseable canonical payload at sequence {}: {e}",
                        event.sequence_number
                    ),
                })?;

            let scan = redaction::scan_payload(&payload);
            for violation in scan.violations {
                let problem = match violation.problem {
                    RedactionProblem::MissingCompanionHash => "missing companion hash",
                    RedactionProblem::MalformedCompanionHash => "malformed companion hash",
                };
                violations.push(ViolationRecord {
                    session_id: event.session_id,
                    event_id: event.event_id,
                    event_sequence_number: event.sequence_number,
                    policy_name: self.name().to_string(),
                    policy_version: ctx.policy_version.clone(),
                    policy_hash: ctx.policy_hash.clone(),
                    severity: ViolationSeverity::Error,
                    description: format!(
                        "Redacted field '{}' has {problem}",
                        violation.field
                    ),
                    metadata: json!({
                        "field_path": violation.path,
                        "check_type": "redaction_integrity",
                    }),
                });
            }
        }

        Ok(violations)
    }
}
