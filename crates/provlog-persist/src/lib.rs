//! # Provlog Persistence
//!
//! Append-only event storage and the ingestion orchestrator.
//!
//! The store is the only shared mutable resource in the system, and the
//! orchestrator is the only writer. Committed rows are never updated and
//! never deleted; `(session_id, sequence_number)` is unique across the whole
//! store; and every batch commits atomically or not at all.

pub mod config;
pub mod export;
pub mod ingest;
pub mod store;

pub use config::ServiceConfig;
pub use export::export_session;
pub use ingest::{IngestBatch, IngestFailure, IngestReceipt, IngestionService};
pub use store::{EventStore, StoreConfig, StoreError};
