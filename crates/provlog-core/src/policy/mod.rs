//! Deterministic policy evaluation over committed events.
//!
//! The engine is a pure function: no I/O, no clocks, no environment lookups
//! inside evaluation. The policy set identity (version, config hash, per
//! policy hashes) is computed once at construction and is immutable for the
//! process lifetime, so every violation can be traced to the exact policy
//! semantics that produced it.

pub mod config;
pub mod engine;
pub mod pii;
pub mod redaction_integrity;
pub mod tool_allowlist;

pub use config::{PolicyConfig, PolicySections, PolicyToggle, ToolAllowlistConfig};
pub use engine::{
    CanonicalEvent, Policy, PolicyContext, PolicyDescriptor, PolicyEngine, PolicyError,
    PolicySet, ViolationRecord, ViolationSeverity,
};
pub use pii::PiiHeuristicPolicy;
pub use redaction_integrity::RedactionIntegrityPolicy;
pub use tool_allowlist::ToolAllowlistPolicy;
