//! Canonical session export: the verifier's input format.
//!
//! An export is a JSON array of committed events, each carrying every stored
//! field plus the `payload` object itself so a third party can recompute all
//! hashes independently. The array may be wrapped in a metadata envelope
//! (version, timestamp, evidence class, chain-of-custody statement, optional
//! seal block); readers ignore unknown top-level fields. The export bytes
//! are themselves RFC 8785 canonical.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canonical::{self, CanonicalError};
use crate::event::{ChainSeal, SealedEvent};

pub const EXPORT_VERSION: &str = "1";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export document must be a JSON array or object")]
    InvalidShape,
    #[error("export object is missing an events array")]
    MissingEvents,
    #[error("committed payload is not valid JSON: {0}")]
    CorruptPayload(String),
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Metadata wrapper written by the export side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub export_version: String,
    pub exported_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_of_custody: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seal: Option<ChainSeal>,
    pub events: Vec<Value>,
}

impl SessionExport {
    /// The canonical bytes of the whole export document.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CanonicalError> {
        canonical::to_canonical_bytes(self)
    }
}

/// What the verifier consumes, after tolerant parsing.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub events: Vec<Value>,
    pub seal: Option<Value>,
}

/// Accept either a bare event array or a metadata wrapper. Unknown top-level
/// fields are ignored.
pub fn parse_export(doc: &Value) -> Result<ExportDocument, ExportError> {
    match doc {
        Value::Array(events) => Ok(ExportDocument {
            events: events.clone(),
            seal: None,
        }),
        Value::Object(map) => {
            let events = map
                .get("events")
                .and_then(Value::as_array)
                .ok_or(ExportError::MissingEvents)?
                .clone();
            let seal = map.get("seal").filter(|v| !v.is_null()).cloned();
            Ok(ExportDocument { events, seal })
        }
        _ => Err(ExportError::InvalidShape),
    }
}

/// Project a committed event into its export form: every stored field plus
/// the payload object reparsed from the canonical bytes.
pub fn exported_event(event: &SealedEvent) -> Result<Value, ExportError> {
    let payload: Value = serde_json::from_str(&event.payload_canonical)
        .map_err(|e| ExportError::CorruptPayload(e.to_string()))?;

    let mut doc = json!({
        "event_id": event.event_id,
        "session_id": event.session_id,
        "sequence_number": event.sequence_number,
        "timestamp_wall": event.timestamp_wall,
        "event_type": event.event_type,
        "payload_hash": event.payload_hash,
        "prev_event_hash": event.prev_event_hash,
        "event_hash": event.event_hash,
        "chain_authority": event.chain_authority,
        "payload": payload,
    });
    if let Some(tm) = event.timestamp_monotonic {
        doc["timestamp_monotonic"] = json!(tm);
    }
    if let Some(ref v) = event.source_sdk_ver {
        doc["source_sdk_ver"] = json!(v);
    }
    if let Some(ref v) = event.schema_ver {
        doc["schema_ver"] = json!(v);
    }
    Ok(doc)
}
