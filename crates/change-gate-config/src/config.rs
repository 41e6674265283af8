// change-gate-config/src/config.rs
// ============================================================================
// Module: Change Gate Configuration
// Description: Configuration loading and validation for the control core.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file resolved from an explicit path,
//! the `CHANGE_GATE_CONFIG` environment variable, or the default filename.
//! Missing or invalid configuration fails closed; every limit is validated
//! before services start so a bad deployment cannot weaken the guardrails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "change-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CHANGE_GATE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Maximum approval token lifetime in seconds (one day).
const MAX_APPROVAL_TTL_SECONDS: u64 = 86_400;
/// Maximum per-device deadline in seconds (one hour).
const MAX_DEVICE_TIMEOUT_SECONDS: u64 = 3_600;
/// Maximum per-RPC timeout in seconds.
const MAX_TRANSPORT_TIMEOUT_SECONDS: u64 = 600;
/// Maximum batch size.
const MAX_BATCH_SIZE: u32 = 100;
/// Maximum inter-batch pause in seconds (one hour).
const MAX_PAUSE_SECONDS: u64 = 3_600;
/// Maximum transport attempts per call.
const MAX_ATTEMPTS: u32 = 10;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Configuration file exceeded the size limit.
    #[error("config file too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: u64,
        /// Actual file size in bytes.
        actual_bytes: u64,
    },
    /// A configured value is outside its permitted range.
    #[error("invalid config value for '{key}': {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// Human-readable constraint description.
        reason: String,
    },
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Apply-phase configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplyConfig {
    /// Total per-device deadline in seconds.
    pub device_timeout_seconds: u64,
    /// Per-RPC read timeout in seconds.
    pub transport_timeout_seconds: u64,
    /// Batch size used when a plan requests 0.
    pub default_batch_size: u32,
    /// Inter-batch pause used when a plan requests 0.
    pub default_pause_seconds: u64,
    /// Maximum transport attempts per call within a device.
    pub max_attempts: u32,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            device_timeout_seconds: 300,
            transport_timeout_seconds: 30,
            default_batch_size: 5,
            default_pause_seconds: 60,
            max_attempts: 3,
        }
    }
}

/// RBAC policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RbacConfig {
    /// When true, production devices reject every write family.
    pub prod_write_default_denied: bool,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            prod_write_default_denied: true,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("change-gate.db"),
        }
    }
}

/// Root configuration for the change-control core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChangeGateConfig {
    /// Approval token lifetime in seconds.
    pub approval_ttl_seconds: ApprovalTtl,
    /// Apply-phase configuration.
    pub apply: ApplyConfig,
    /// RBAC policy configuration.
    pub rbac: RbacConfig,
    /// Persistence configuration.
    pub store: StoreConfig,
}

/// Approval TTL wrapper carrying the documented default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalTtl(pub u64);

impl Default for ApprovalTtl {
    fn default() -> Self {
        Self(900)
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl ChangeGateConfig {
    /// Loads and validates configuration.
    ///
    /// Resolution order: explicit `path`, the `CHANGE_GATE_CONFIG`
    /// environment variable, then `change-gate.toml` in the working
    /// directory. A missing file yields the documented defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or a
    /// value fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved: PathBuf = match path {
            Some(path) => path.to_path_buf(),
            None => env::var_os(CONFIG_ENV_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from),
        };
        let config = if resolved.exists() {
            let metadata =
                fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
            if metadata.len() > MAX_CONFIG_FILE_SIZE {
                return Err(ConfigError::TooLarge {
                    max_bytes: MAX_CONFIG_FILE_SIZE,
                    actual_bytes: metadata.len(),
                });
            }
            let contents =
                fs::read_to_string(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
            toml::from_str(&contents).map_err(|err| ConfigError::Parse(err.to_string()))?
        } else if path.is_some() {
            return Err(ConfigError::Io(format!(
                "config file '{}' does not exist",
                resolved.display()
            )));
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates every configured value against its permitted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.approval_ttl_seconds.0 == 0 || self.approval_ttl_seconds.0 > MAX_APPROVAL_TTL_SECONDS
        {
            return Err(ConfigError::Invalid {
                key: "approval_ttl_seconds",
                reason: format!("must be in 1..={MAX_APPROVAL_TTL_SECONDS}"),
            });
        }
        if self.apply.device_timeout_seconds == 0
            || self.apply.device_timeout_seconds > MAX_DEVICE_TIMEOUT_SECONDS
        {
            return Err(ConfigError::Invalid {
                key: "apply.device_timeout_seconds",
                reason: format!("must be in 1..={MAX_DEVICE_TIMEOUT_SECONDS}"),
            });
        }
        if self.apply.transport_timeout_seconds == 0
            || self.apply.transport_timeout_seconds > MAX_TRANSPORT_TIMEOUT_SECONDS
        {
            return Err(ConfigError::Invalid {
                key: "apply.transport_timeout_seconds",
                reason: format!("must be in 1..={MAX_TRANSPORT_TIMEOUT_SECONDS}"),
            });
        }
        if self.apply.transport_timeout_seconds > self.apply.device_timeout_seconds {
            return Err(ConfigError::Invalid {
                key: "apply.transport_timeout_seconds",
                reason: "must not exceed apply.device_timeout_seconds".to_string(),
            });
        }
        if self.apply.default_batch_size == 0 || self.apply.default_batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                key: "apply.default_batch_size",
                reason: format!("must be in 1..={MAX_BATCH_SIZE}"),
            });
        }
        if self.apply.default_pause_seconds > MAX_PAUSE_SECONDS {
            return Err(ConfigError::Invalid {
                key: "apply.default_pause_seconds",
                reason: format!("must be at most {MAX_PAUSE_SECONDS}"),
            });
        }
        if self.apply.max_attempts == 0 || self.apply.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::Invalid {
                key: "apply.max_attempts",
                reason: format!("must be in 1..={MAX_ATTEMPTS}"),
            });
        }
        Ok(())
    }
}
