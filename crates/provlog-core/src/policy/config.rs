//! Declarative policy configuration.
//!
//! Loaded once at process start from a TOML file; the engine treats the
//! resulting value as immutable for the process lifetime.
//!
//! ```toml
//! version = "1.0.0"
//!
//! [policies.redaction_integrity]
//! enabled = true
//!
//! [policies.pii]
//! enabled = true
//!
//! [policies.tool_allowlist]
//! enabled = true
//! allowed_tools = ["web_search", "calculator"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::canonical;
use crate::hash;

use super::engine::PolicyError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub policies: PolicySections,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            policies: PolicySections::default(),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySections {
    #[serde(default = "PolicyToggle::enabled")]
    pub redaction_integrity: PolicyToggle,
    #[serde(default = "PolicyToggle::enabled")]
    pub pii: PolicyToggle,
    #[serde(default)]
    pub tool_allowlist: ToolAllowlistConfig,
}

impl Default for PolicySections {
    fn default() -> Self {
        Self {
            redaction_integrity: PolicyToggle::enabled(),
            pii: PolicyToggle::enabled(),
            tool_allowlist: ToolAllowlistConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyToggle {
    #[serde(default)]
    pub enabled: bool,
}

impl PolicyToggle {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAllowlistConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl PolicyConfig {
    /// Load the configuration file. Missing file is an error: a worker must
    /// not start without an explicit policy identity.
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| PolicyError::Config(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| PolicyError::Config(e.to_string()))
    }

    /// `SHA-256(canonical(config))`.
    pub fn config_hash(&self) -> Result<String, PolicyError> {
        let value = serde_json::to_value(self).map_err(|e| PolicyError::Config(e.to_string()))?;
        Ok(hash::sha256_hex(&canonical::to_canonical_bytes(&value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_structural_policies_only() {
        let config = PolicyConfig::default();
        assert!(config.policies.redaction_integrity.enabled);
        assert!(config.policies.pii.enabled);
        assert!(!config.policies.tool_allowlist.enabled);
        assert!(config.policies.tool_allowlist.allowed_tools.is_empty());
    }

    #[test]
    fn config_hash_is_stable_and_sensitive() {
        let a = PolicyConfig::default();
        let b = PolicyConfig::default();
        assert_eq!(a.config_hash().unwrap(), b.config_hash().unwrap());

        let mut c = PolicyConfig::default();
        c.version = "2.0.0".into();
        assert_ne!(a.config_hash().unwrap(), c.config_hash().unwrap());
    }
}
