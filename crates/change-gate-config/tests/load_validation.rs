// change-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load and Validation Tests
// Description: TOML loading, unknown keys, and range validation.
// ============================================================================
//! ## Overview
//! Loads configuration from temporary files and asserts fail-closed behavior
//! for unknown keys and out-of-range values.

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

use std::fs;
use std::path::PathBuf;

use change_gate_config::ChangeGateConfig;
use change_gate_config::ConfigError;
use tempfile::TempDir;

/// Writes a config file and loads it.
fn load(contents: &str) -> Result<ChangeGateConfig, ConfigError> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("change-gate.toml");
    fs::write(&path, contents).expect("write config");
    ChangeGateConfig::load(Some(&path))
}

/// A complete file overrides every default.
#[test]
fn test_load_full_file() {
    let config = load(
        r#"
approval_ttl_seconds = 600

[apply]
device_timeout_seconds = 120
transport_timeout_seconds = 10
default_batch_size = 2
default_pause_seconds = 5
max_attempts = 2

[rbac]
prod_write_default_denied = false

[store]
path = "/var/lib/change-gate/state.db"
"#,
    )
    .expect("valid config loads");
    assert_eq!(config.approval_ttl_seconds.0, 600);
    assert_eq!(config.apply.default_batch_size, 2);
    assert!(!config.rbac.prod_write_default_denied);
    assert_eq!(config.store.path, PathBuf::from("/var/lib/change-gate/state.db"));
}

/// Partial files inherit defaults for omitted keys.
#[test]
fn test_load_partial_file() {
    let config = load("approval_ttl_seconds = 300\n").expect("partial config loads");
    assert_eq!(config.approval_ttl_seconds.0, 300);
    assert_eq!(config.apply.default_batch_size, 5);
}

/// Unknown keys fail closed instead of being ignored.
#[test]
fn test_unknown_keys_rejected() {
    let error = load("enable_everything = true\n").expect_err("unknown key rejected");
    assert!(matches!(error, ConfigError::Parse(_)));
}

/// A zero TTL is rejected.
#[test]
fn test_zero_ttl_rejected() {
    let error = load("approval_ttl_seconds = 0\n").expect_err("zero ttl rejected");
    match error {
        ConfigError::Invalid {
            key, ..
        } => assert_eq!(key, "approval_ttl_seconds"),
        other => panic!("unexpected error: {other}"),
    }
}

/// Batch sizes above the cap are rejected.
#[test]
fn test_oversized_batch_rejected() {
    let error =
        load("[apply]\ndefault_batch_size = 500\n").expect_err("oversized batch rejected");
    match error {
        ConfigError::Invalid {
            key, ..
        } => assert_eq!(key, "apply.default_batch_size"),
        other => panic!("unexpected error: {other}"),
    }
}

/// The per-RPC timeout may not exceed the device deadline.
#[test]
fn test_transport_timeout_bounded_by_device_deadline() {
    let error = load("[apply]\ndevice_timeout_seconds = 20\ntransport_timeout_seconds = 30\n")
        .expect_err("inverted timeouts rejected");
    match error {
        ConfigError::Invalid {
            key, ..
        } => assert_eq!(key, "apply.transport_timeout_seconds"),
        other => panic!("unexpected error: {other}"),
    }
}

/// An explicitly named missing file is an error, not a silent default.
#[test]
fn test_missing_explicit_file_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("absent.toml");
    let error = ChangeGateConfig::load(Some(&path)).expect_err("missing file rejected");
    assert!(matches!(error, ConfigError::Io(_)));
}
