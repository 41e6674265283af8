// change-gate-config/tests/config_defaults.rs
// ============================================================================
// Module: Config Default Tests
// Description: Documented defaults and default-path behavior.
// ============================================================================
//! ## Overview
//! Asserts the documented default for every configuration key.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::path::PathBuf;

use change_gate_config::ChangeGateConfig;

/// Every key defaults to its documented value.
#[test]
fn test_documented_defaults() {
    let config = ChangeGateConfig::default();
    assert_eq!(config.approval_ttl_seconds.0, 900);
    assert_eq!(config.apply.device_timeout_seconds, 300);
    assert_eq!(config.apply.transport_timeout_seconds, 30);
    assert_eq!(config.apply.default_batch_size, 5);
    assert_eq!(config.apply.default_pause_seconds, 60);
    assert_eq!(config.apply.max_attempts, 3);
    assert!(config.rbac.prod_write_default_denied);
    assert_eq!(config.store.path, PathBuf::from("change-gate.db"));
}

/// Defaults pass validation unchanged.
#[test]
fn test_defaults_validate() {
    ChangeGateConfig::default().validate().expect("defaults are valid");
}
