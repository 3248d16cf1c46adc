//! Tool allow-list policy.
//!
//! Every TOOL_CALL must name a tool from the configured allow-list. The
//! policy states factual violations only; it does not infer intent.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use super::engine::{
    CanonicalEvent, Policy, PolicyContext, PolicyError, ViolationRecord, ViolationSeverity,
};
use crate::event::EventType;

const SOURCE: &str = include_str!("tool_allowlist.rs");

pub struct ToolAllowlistPolicy {
    allowed: BTreeSet<String>,
}

impl ToolAllowlistPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Policy for ToolAllowlistPolicy {
    fn name(&self) -> &'static str {
        "tool_allowlist"
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
        // An empty allow-list disables the audit rather than banning all tools.
        if self.allowed.is_empty() {
            return Ok(Vec::new());
        }

        let mut violations = Vec::new();

        for event in events {
            if event.event_type != EventType::ToolCall {
                continue;
            }

            match extract_tool_name(&event.payload_canonical) {
                Some(tool_name) if self.allowed.contains(&tool_name) => {}
                Some(tool_name) => violations.push(ViolationRecord {
                    session_id: event.session_id,
                    event_id: event.event_id,
                    event_sequence_number: event.sequence_number,
                    policy_name: self.name().to_string(),
                    policy_version: ctx.policy_version.clone(),
                    policy_hash: ctx.policy_hash.clone(),
                    severity: ViolationSeverity::Critical,
                    description: format!(
                        "Tool '{tool_name}' not in allowed list per policy configuration v{}",
                        ctx.policy_version
                    ),
                    metadata: json!({
                        "tool_name": tool_name,
                        "allowed_tools": self.allowed,
                        "check_type": "tool_allowlist",
                    }),
                }),
                None => violations.push(ViolationRecord {
                    session_id: event.session_id,
                    event_id: event.event_id,
                    event_sequence_number: event.sequence_number,
                    policy_name: self.name().to_string(),
                    policy_version: ctx.policy_version.clone(),
                    policy_hash: ctx.policy_hash.clone(),
                    severity: ViolationSeverity::Error,
                    description: "Unparseable TOOL_CALL payload: missing or invalid tool_name"
                        .to_string(),
                    metadata: json!({
                        "raw_payload_prefix": truncate(&event.payload_canonical, 200),
                        "check_type": "tool_allowlist",
                    }),
                }),
            }
        }

        Ok(violations)
    }
}

fn extract_tool_name(payload_canonical: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(payload_canonical).ok()?;
    payload
        .get("tool_name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}
