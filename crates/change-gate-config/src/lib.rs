// change-gate-config/src/lib.rs
// ============================================================================
// Module: Change Gate Config Library
// Description: Canonical configuration model and validation.
// Purpose: Expose strict, fail-closed configuration loading.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits
//! and validated fail-closed before any service starts. Hosts map the loaded
//! values onto the core's plan and apply settings.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ApplyConfig;
pub use config::ApprovalTtl;
pub use config::CONFIG_ENV_VAR;
pub use config::ChangeGateConfig;
pub use config::ConfigError;
pub use config::RbacConfig;
pub use config::StoreConfig;
