//! Service configuration.
//!
//! Loaded once at process start from the environment. The chain authority
//! identifier is part of the seal contract: it is fixed here and never
//! changes for the process lifetime.

use std::env;
use std::path::PathBuf;

use provlog_core::sealer::DEFAULT_CHAIN_AUTHORITY;

/// Default batch ceiling.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Database URL (env: `PROVLOG_DATABASE_URL`)
    pub database_url: String,
    /// Sealing authority identifier (env: `PROVLOG_CHAIN_AUTHORITY`)
    pub chain_authority: String,
    /// Declarative policy file (env: `PROVLOG_POLICY_CONFIG`)
    pub policy_config_path: Option<PathBuf>,
    /// Maximum events per batch (env: `PROVLOG_MAX_BATCH_SIZE`)
    pub max_batch_size: usize,
    /// Maximum canonical payload bytes (env: `PROVLOG_MAX_PAYLOAD_BYTES`)
    pub max_payload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:provlog.db?mode=rwc".to_string(),
            chain_authority: DEFAULT_CHAIN_AUTHORITY.to_string(),
            policy_config_path: None,
            max_batch_size: MAX_BATCH_SIZE,
            max_payload_bytes: provlog_core::validator::MAX_PAYLOAD_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("PROVLOG_DATABASE_URL").unwrap_or(defaults.database_url),
            chain_authority: env::var("PROVLOG_CHAIN_AUTHORITY")
                .unwrap_or(defaults.chain_authority),
            policy_config_path: env::var("PROVLOG_POLICY_CONFIG").ok().map(PathBuf::from),
            max_batch_size: env::var("PROVLOG_MAX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_batch_size),
            max_payload_bytes: env::var("PROVLOG_MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_payload_bytes),
        }
    }
}
