//! Ingress validation: the gate between untrusted producers and the sealer.
//!
//! Responsibilities, in order (the first failure terminates):
//! 1. Authority-leak detection
//! 2. Strict schema (closed field set, exact types)
//! 3. Timestamp validation (ISO-8601 with explicit timezone)
//! 4. RFC 8785 canonicalization of the payload
//! 5. Payload-hash recomputation and comparison
//!
//! Output is an immutable [`ValidatedClaim`] or a hard failure. No partial
//! success, no side effects.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::IngestError;
use crate::event::{EventType, ValidatedClaim};
use crate::hash;

/// Default ceiling on the canonical payload size (1 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

const REQUIRED_FIELDS: [&str; 6] = [
    "event_id",
    "session_id",
    "sequence_number",
    "timestamp_wall",
    "event_type",
    "payload",
];

const OPTIONAL_FIELDS: [&str; 5] = [
    "payload_hash",
    "prev_event_hash",
    "timestamp_monotonic",
    "source_sdk_ver",
    "schema_ver",
];

/// Fields a producer must never supply with a value.
const FORBIDDEN_FIELDS: [&str; 2] = ["event_hash", "chain_authority"];

static ISO8601: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})$")
        .expect("ISO-8601 pattern is valid")
});

/// The ingress validator. Pure; holds only its size limit.
#[derive(Debug, Clone)]
pub struct Validator {
    max_payload_bytes: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

impl Validator {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// Validate a raw event claim.
    pub fn validate(&self, raw: &Value) -> Result<ValidatedClaim, IngestError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| IngestError::schema_invalid(json!({"error": "event must be an object"})))?;

        // 1. Authority leak, first so misbehaved clients learn immediately.
        check_authority_leak(obj)?;

        // 2. Strict schema.
        check_schema(obj)?;

        let event_id = parse_uuid_field(obj, "event_id")?;
        let session_id = parse_uuid_field(obj, "session_id")?;
        let sequence_number = obj["sequence_number"]
            .as_u64()
            .expect("checked by schema");
        let timestamp_wall = obj["timestamp_wall"]
            .as_str()
            .expect("checked by schema")
            .to_string();
        let event_type = EventType::parse(obj["event_type"].as_str().expect("checked by schema"))
            .expect("checked by schema");

        // 3. Timestamp.
        let timestamp_parsed = validate_timestamp(&timestamp_wall)?;

        // 4. Canonicalization.
        let payload = &obj["payload"];
        let payload_canonical = crate::canonical::to_canonical_string(payload)
            .map_err(|e| IngestError::jcs_invalid(json!({"error": e.to_string()})))?;
        if payload_canonical.len() > self.max_payload_bytes {
            return Err(IngestError::schema_invalid(json!({
                "field": "payload",
                "error": "canonical payload exceeds size limit",
                "limit_bytes": self.max_payload_bytes,
                "received_bytes": payload_canonical.len(),
            })));
        }

        // 5. Payload hash.
        let computed_hash = hash::sha256_hex(payload_canonical.as_bytes());
        if let Some(client_hash) = obj.get("payload_hash").and_then(Value::as_str) {
            if !client_hash.eq_ignore_ascii_case(&computed_hash) {
                return Err(IngestError::payload_hash_mismatch(&computed_hash, client_hash));
            }
        }

        Ok(ValidatedClaim {
            event_id,
            session_id,
            sequence_number,
            timestamp_wall,
            timestamp_parsed,
            event_type,
            payload_canonical,
            payload_hash: computed_hash,
            timestamp_monotonic: obj.get("timestamp_monotonic").and_then(Value::as_f64),
            source_sdk_ver: obj
                .get("source_sdk_ver")
                .and_then(Value::as_str)
                .map(str::to_string),
            schema_ver: obj.get("schema_ver").map(schema_ver_string),
        })
    }
}

fn check_authority_leak(obj: &Map<String, Value>) -> Result<(), IngestError> {
    for field in FORBIDDEN_FIELDS {
        if let Some(v) = obj.get(field) {
            if !v.is_null() {
                return Err(IngestError::authority_leak());
            }
        }
    }
    Ok(())
}

fn check_schema(obj: &Map<String, Value>) -> Result<(), IngestError> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| !obj.contains_key(*f))
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::schema_invalid(json!({"missing_fields": missing})));
    }

    // Forbidden fields with explicit nulls passed the leak check; their names
    // are still outside the schema and land here as unexpected.
    let unexpected: Vec<&String> = obj
        .keys()
        .filter(|k| {
            !REQUIRED_FIELDS.contains(&k.as_str()) && !OPTIONAL_FIELDS.contains(&k.as_str())
        })
        .collect();
    if !unexpected.is_empty() {
        return Err(IngestError::schema_invalid(json!({"unexpected_fields": unexpected})));
    }

    require_string(obj, "event_id")?;
    require_string(obj, "session_id")?;

    // sequence_number: non-negative integer. JSON booleans and floats are
    // distinct value kinds and fail the as_u64 probe.
    match obj["sequence_number"].as_u64() {
        Some(_) => {}
        None => {
            return Err(IngestError::schema_invalid(json!({
                "field": "sequence_number",
                "error": "must be a non-negative integer",
            })))
        }
    }

    require_string(obj, "timestamp_wall")?;

    let event_type = require_string(obj, "event_type")?;
    if EventType::parse(event_type).is_none() {
        return Err(IngestError::schema_invalid(json!({
            "field": "event_type",
            "error": "invalid event type",
            "received": event_type,
            "valid": EventType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        })));
    }

    if !obj["payload"].is_object() {
        return Err(IngestError::schema_invalid(json!({
            "field": "payload",
            "error": "must be an object",
        })));
    }

    // Optional field types.
    if let Some(v) = obj.get("payload_hash") {
        if !v.is_string() {
            return Err(IngestError::schema_invalid(json!({
                "field": "payload_hash",
                "error": "must be a string",
            })));
        }
    }
    if let Some(v) = obj.get("prev_event_hash") {
        if !v.is_string() && !v.is_null() {
            return Err(IngestError::schema_invalid(json!({
                "field": "prev_event_hash",
                "error": "must be a string or null",
            })));
        }
    }
    if let Some(v) = obj.get("timestamp_monotonic") {
        if !v.is_number() {
            return Err(IngestError::schema_invalid(json!({
                "field": "timestamp_monotonic",
                "error": "must be a number",
            })));
        }
    }
    if let Some(v) = obj.get("source_sdk_ver") {
        if !v.is_string() {
            return Err(IngestError::schema_invalid(json!({
                "field": "source_sdk_ver",
                "error": "must be a string",
            })));
        }
    }
    if let Some(v) = obj.get("schema_ver") {
        if !v.is_string() && !v.is_i64() && !v.is_u64() {
            return Err(IngestError::schema_invalid(json!({
                "field": "schema_ver",
                "error": "must be a string or integer",
            })));
        }
    }

    Ok(())
}

fn require_string<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, IngestError> {
    obj[field].as_str().ok_or_else(|| {
        IngestError::schema_invalid(json!({"field": field, "error": "must be a string"}))
    })
}

fn parse_uuid_field(obj: &Map<String, Value>, field: &str) -> Result<Uuid, IngestError> {
    let s = obj[field].as_str().expect("checked by schema");
    Uuid::parse_str(s).map_err(|_| {
        IngestError::schema_invalid(json!({"field": field, "error": "must be a UUID"}))
    })
}

fn validate_timestamp(ts: &str) -> Result<chrono::DateTime<chrono::FixedOffset>, IngestError> {
    if !ISO8601.is_match(ts) {
        return Err(IngestError::timestamp_invalid(
            ts,
            "must be ISO-8601 with timezone (e.g. 2024-05-01T12:00:00Z)",
        ));
    }
    chrono::DateTime::parse_from_rfc3339(ts)
        .map_err(|e| IngestError::timestamp_invalid(ts, &e.to_string()))
}

fn schema_ver_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
