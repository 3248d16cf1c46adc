//! Read-only session export.
//!
//! Generates the canonical export document the offline verifier consumes.
//! Cannot write, cannot seal, cannot infer.

use uuid::Uuid;

use provlog_core::export::{exported_event, SessionExport, EXPORT_VERSION};

use crate::store::{now_iso, EventStore, StoreError};

/// Statement embedded in every export.
const CHAIN_OF_CUSTODY: &str =
    "All hashes were recomputed server-side at ingest; this export is read-only \
     and verifiable offline against the embedded chain.";

#[derive(Debug, thiserror::Error)]
pub enum ExportFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("committed event cannot be exported: {0}")]
    Corrupt(String),
}

/// Export a session, or `None` when it has no committed events.
pub async fn export_session(
    store: &EventStore,
    session_id: Uuid,
) -> Result<Option<SessionExport>, ExportFailure> {
    let events = store.session_events(session_id).await?;
    if events.is_empty() {
        return Ok(None);
    }

    let seal = store.get_seal(session_id).await?;
    let evidence_class = store.session_evidence_class(session_id).await?;

    let exported = events
        .iter()
        .map(|e| exported_event(e).map_err(|err| ExportFailure::Corrupt(err.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(SessionExport {
        export_version: EXPORT_VERSION.to_string(),
        exported_at: now_iso(),
        evidence_class,
        chain_of_custody: Some(CHAIN_OF_CUSTODY.to_string()),
        seal,
        events: exported,
    }))
}
