//! Event model: claims, sealed events, chain state, and seals.
//!
//! A claim is what a producer asserts; a sealed event is what the service
//! commits. No field of a sealed event ever changes after commit, and events
//! reference their predecessor only by hash value, never by pointer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Closed set of event discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "SESSION_START")]
    SessionStart,
    #[serde(rename = "SESSION_END")]
    SessionEnd,
    #[serde(rename = "MODEL_REQUEST")]
    ModelRequest,
    #[serde(rename = "MODEL_RESPONSE")]
    ModelResponse,
    #[serde(rename = "TOOL_CALL")]
    ToolCall,
    #[serde(rename = "TOOL_RESULT")]
    ToolResult,
    #[serde(rename = "AGENT_STATE_SNAPSHOT")]
    AgentStateSnapshot,
    #[serde(rename = "AGENT_DECISION")]
    AgentDecision,
    #[serde(rename = "DECISION_TRACE")]
    DecisionTrace,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "ANNOTATION")]
    Annotation,
    #[serde(rename = "CHAIN_SEAL")]
    ChainSeal,
    #[serde(rename = "LOG_DROP")]
    LogDrop,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        Self::SessionStart,
        Self::SessionEnd,
        Self::ModelRequest,
        Self::ModelResponse,
        Self::ToolCall,
        Self::ToolResult,
        Self::AgentStateSnapshot,
        Self::AgentDecision,
        Self::DecisionTrace,
        Self::Error,
        Self::Annotation,
        Self::ChainSeal,
        Self::LogDrop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "SESSION_START",
            Self::SessionEnd => "SESSION_END",
            Self::ModelRequest => "MODEL_REQUEST",
            Self::ModelResponse => "MODEL_RESPONSE",
            Self::ToolCall => "TOOL_CALL",
            Self::ToolResult => "TOOL_RESULT",
            Self::AgentStateSnapshot => "AGENT_STATE_SNAPSHOT",
            Self::AgentDecision => "AGENT_DECISION",
            Self::DecisionTrace => "DECISION_TRACE",
            Self::Error => "ERROR",
            Self::Annotation => "ANNOTATION",
            Self::ChainSeal => "CHAIN_SEAL",
            Self::LogDrop => "LOG_DROP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Committing an event of this type closes the session.
    pub fn closes_session(&self) -> bool {
        matches!(self, Self::SessionEnd | Self::ChainSeal)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable validated claim, ready for sealing.
///
/// Carries the producer's fields verbatim plus the canonical payload bytes
/// and the recomputed payload hash. Never carries authority fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedClaim {
    pub event_id: Uuid,
    pub session_id: Uuid,
    pub sequence_number: u64,
    /// Verbatim timestamp string; this exact form enters the signed preimage.
    pub timestamp_wall: String,
    pub timestamp_parsed: chrono::DateTime<chrono::FixedOffset>,
    pub event_type: EventType,
    /// RFC 8785 canonical form of the payload.
    pub payload_canonical: String,
    /// SHA-256 of `payload_canonical`, lowercase hex.
    pub payload_hash: String,
    pub timestamp_monotonic: Option<f64>,
    pub source_sdk_ver: Option<String>,
    pub schema_ver: Option<String>,
}

/// Immutable sealed event. Only the sealer constructs this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEvent {
    pub event_id: Uuid,
    pub session_id: Uuid,
    pub sequence_number: u64,
    pub timestamp_wall: String,
    pub event_type: EventType,
    pub payload_canonical: String,
    pub payload_hash: String,
    /// `event_hash` of the previous event in the session; `None` at genesis.
    pub prev_event_hash: Option<String>,
    /// SHA-256 over the canonical signed envelope (seven fields).
    pub event_hash: String,
    /// Identity of the sealing authority.
    pub chain_authority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_monotonic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_sdk_ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_ver: Option<String>,
}

/// Current state of a session's chain, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub session_id: Uuid,
    pub last_sequence: u64,
    pub last_event_hash: String,
    /// The session contains a SESSION_END or CHAIN_SEAL event.
    pub closed: bool,
}

/// Singleton record finalizing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSeal {
    pub session_id: Uuid,
    pub sealing_authority_id: String,
    pub seal_timestamp: String,
    /// SHA-256 over session id, every event hash, and the final event hash.
    pub session_digest: String,
    pub final_event_hash: String,
    pub event_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names_round_trip() {
        for t in EventType::ALL {
            assert_eq!(EventType::parse(t.as_str()), Some(t));
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, t.as_str());
        }
        assert_eq!(EventType::parse("SESSION_PAUSE"), None);
    }

    #[test]
    fn closing_types() {
        assert!(EventType::SessionEnd.closes_session());
        assert!(EventType::ChainSeal.closes_session());
        assert!(!EventType::LogDrop.closes_session());
        assert!(!EventType::ToolCall.closes_session());
    }

    #[test]
    fn sealed_event_omits_absent_optionals() {
        let event = SealedEvent {
            event_id: Uuid::nil(),
            session_id: Uuid::nil(),
            sequence_number: 0,
            timestamp_wall: "2024-05-01T12:00:00Z".into(),
            event_type: EventType::SessionStart,
            payload_canonical: "{}".into(),
            payload_hash: "00".into(),
            prev_event_hash: None,
            event_hash: "11".into(),
            chain_authority: "provlog-ingest-v1".into(),
            timestamp_monotonic: None,
            source_sdk_ver: None,
            schema_ver: None,
        };
        let v = serde_json::to_value(&event).unwrap();
        assert!(v.get("timestamp_monotonic").is_none());
        // prev_event_hash is part of the signed envelope and always present
        assert!(v["prev_event_hash"].is_null());
    }
}
