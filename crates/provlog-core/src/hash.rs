//! SHA-256 digest helpers.
//!
//! All digests in the system are lowercase hex SHA-256.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::{self, CanonicalError};

/// SHA-256 of raw bytes, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 over the canonical form of a JSON payload.
pub fn payload_digest(payload: &Value) -> Result<String, CanonicalError> {
    Ok(sha256_hex(&canonical::to_canonical_bytes(payload)?))
}

/// Session digest: SHA-256 over the ASCII concatenation of the session id,
/// every event hash in sequence order, and the final event hash.
pub fn session_digest<S: AsRef<str>>(
    session_id: &str,
    event_hashes: &[S],
    final_event_hash: &str,
) -> String {
    let mut input = String::with_capacity(
        session_id.len() + final_event_hash.len() + event_hashes.len() * 64,
    );
    input.push_str(session_id);
    for h in event_hashes {
        input.push_str(h.as_ref());
    }
    input.push_str(final_event_hash);
    sha256_hex(input.as_bytes())
}
