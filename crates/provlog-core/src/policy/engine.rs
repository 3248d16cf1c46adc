//! Policy engine: loads, versions, and evaluates policies.
//!
//! Constraints:
//! - `evaluate()` is pure. Same events + same policy set → identical output.
//! - Every violation records the policy set version and the policy hash.
//! - `policy_hash = SHA-256(policy source text || canonical config subset)`,
//!   so a config change (say, the tool allow-list) changes the hash even
//!   when the code did not.
//! - Evaluation failures propagate; the caller rolls back the whole batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::{self, CanonicalError};
use crate::event::{EventType, SealedEvent};
use crate::hash;

use super::config::PolicyConfig;
use super::pii::PiiHeuristicPolicy;
use super::redaction_integrity::RedactionIntegrityPolicy;
use super::tool_allowlist::ToolAllowlistPolicy;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy configuration error: {0}")]
    Config(String),
    #[error("policy '{policy}' evaluation failed: {message}")]
    Evaluation { policy: String, message: String },
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Severity of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl ViolationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Immutable, canonical view of a committed event.
///
/// This is the only input type policies see. The payload is the canonical
/// byte string; policies that need structured access parse it themselves and
/// own their failure handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub event_id: Uuid,
    pub session_id: Uuid,
    pub sequence_number: u64,
    pub event_type: EventType,
    pub payload_canonical: String,
    pub payload_hash: String,
    pub event_hash: String,
    pub chain_authority: String,
}

impl From<&SealedEvent> for CanonicalEvent {
    fn from(e: &SealedEvent) -> Self {
        Self {
            event_id: e.event_id,
            session_id: e.session_id,
            sequence_number: e.sequence_number,
            event_type: e.event_type,
            payload_canonical: e.payload_canonical.clone(),
            payload_hash: e.payload_hash.clone(),
            event_hash: e.event_hash.clone(),
            chain_authority: e.chain_authority.clone(),
        }
    }
}

/// Immutable output of a policy evaluation.
///
/// The engine stamps neither an id nor a timestamp: both would break
/// determinism, so the persistence layer assigns them at commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub session_id: Uuid,
    pub event_id: Uuid,
    pub event_sequence_number: u64,
    pub policy_name: String,
    pub policy_version: String,
    pub policy_hash: String,
    pub severity: ViolationSeverity,
    pub description: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Identity of a single policy at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDescriptor {
    pub name: String,
    pub version: String,
    pub policy_hash: String,
    pub enabled: bool,
}

/// Immutable snapshot of the active policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicySet {
    pub version: String,
    /// SHA-256 of the canonical configuration document.
    pub config_hash: String,
    pub policies: Vec<PolicyDescriptor>,
}

/// Identity handed to each policy at evaluation time.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub policy_version: String,
    pub policy_hash: String,
}

/// A single policy. Evaluation must be pure.
pub trait Policy: Send + Sync {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str;
    /// The policy's own source text, embedded at compile time. Feeds the
    /// policy hash so code changes are visible in violation records.
    fn source_text(&self) -> &'static str;
    fn evaluate(
        &self,
        events: &[CanonicalEvent],
        ctx: &PolicyContext,
    ) -> Result<Vec<ViolationRecord>, PolicyError>;
}

struct RegisteredPolicy {
    policy: Box<dyn Policy>,
    policy_hash: String,
}

/// Loads, versions, and runs policies. Constructed once at process start.
pub struct PolicyEngine {
    registered: Vec<RegisteredPolicy>,
    set: PolicySet,
}

impl PolicyEngine {
    /// Build the engine from a declarative configuration, registering the
    /// built-in policies that are enabled.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        let config_hash = config.config_hash()?;
        let mut registered: Vec<RegisteredPolicy> = Vec::new();

        if config.policies.redaction_integrity.enabled {
            register(
                &mut registered,
                Box::new(RedactionIntegrityPolicy),
                subset_value(&config.policies.redaction_integrity)?,
            );
        }
        if config.policies.pii.enabled {
            register(
                &mut registered,
                Box::new(PiiHeuristicPolicy),
                subset_value(&config.policies.pii)?,
            );
        }
        if config.policies.tool_allowlist.enabled {
            register(
                &mut registered,
                Box::new(ToolAllowlistPolicy::new(
                    config.policies.tool_allowlist.allowed_tools.clone(),
                )),
                subset_value(&config.policies.tool_allowlist)?,
            );
        }

        let descriptors = registered
            .iter()
            .map(|r| PolicyDescriptor {
                name: r.policy.name().to_string(),
                version: r.policy.version().to_string(),
                policy_hash: r.policy_hash.clone(),
                enabled: true,
            })
            .collect();

        let set = PolicySet {
            version: config.version.clone(),
            config_hash,
            policies: descriptors,
        };

        tracing::info!(
            version = %set.version,
            config_hash = %set.config_hash,
            policies = set.policies.len(),
            "policy set loaded"
        );

        Ok(Self { registered, set })
    }

    /// The immutable policy set identity.
    pub fn policy_set(&self) -> &PolicySet {
        &self.set
    }

    /// Evaluate all active policies over committed events.
    ///
    /// Pure and deterministic. A policy failure is returned to the caller,
    /// which rolls back the batch it was evaluating.
    pub fn evaluate(
        &self,
        events: &[CanonicalEvent],
    ) -> Result<Vec<ViolationRecord>, PolicyError> {
        let mut all = Vec::new();
        for reg in &self.registered {
            let ctx = PolicyContext {
                policy_version: self.set.version.clone(),
                policy_hash: reg.policy_hash.clone(),
            };
            all.extend(reg.policy.evaluate(events, &ctx)?);
        }
        Ok(all)
    }
}

fn register(registered: &mut Vec<RegisteredPolicy>, policy: Box<dyn Policy>, subset: Value) {
    let policy_hash = compute_policy_hash(policy.source_text(), &subset);
    registered.push(RegisteredPolicy {
        policy,
        policy_hash,
    });
}

fn subset_value<T: Serialize>(section: &T) -> Result<Value, PolicyError> {
    serde_json::to_value(section).map_err(|e| PolicyError::Config(e.to_string()))
}

/// `SHA-256(source || "\n---\n" || canonical(config subset))`.
fn compute_policy_hash(source: &str, subset: &Value) -> String {
    let canonical_subset =
        canonical::to_canonical_string(subset).unwrap_or_else(|_| "{}".to_string());
    let mut combined = String::with_capacity(source.len() + canonical_subset.len() + 5);
    combined.push_str(source);
    combined.push_str("\n---\n");
    combined.push_str(&canonical_subset);
    hash::sha256_hex(combined.as_bytes())
}
