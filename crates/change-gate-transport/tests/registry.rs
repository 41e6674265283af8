// change-gate-transport/tests/registry.rs
// ============================================================================
// Module: Transport Registry Tests
// Description: Credential-kind dispatch and scheme policy.
// ============================================================================
//! ## Overview
//! Verifies fail-closed dispatch for unregistered credential kinds and the
//! HTTPS-only scheme policy, without touching the network.

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

use std::collections::BTreeSet;

use change_gate_core::CapabilityFlags;
use change_gate_core::Credential;
use change_gate_core::CredentialId;
use change_gate_core::CredentialKind;
use change_gate_core::Device;
use change_gate_core::DeviceId;
use change_gate_core::DeviceStatus;
use change_gate_core::Environment;
use change_gate_core::SecretMaterial;
use change_gate_core::TransportError;
use change_gate_core::TransportFactory;
use change_gate_transport::TransportRegistry;

/// Builds a device with the given management address.
fn device(address: &str) -> Device {
    Device {
        id: DeviceId::new("dev-lab-01"),
        name: "router-dev-lab-01".to_string(),
        management_address: address.to_string(),
        environment: Environment::Lab,
        status: DeviceStatus::Healthy,
        tags: BTreeSet::new(),
        capabilities: CapabilityFlags::default(),
        os_version: None,
        system_identity: None,
        hardware_model: None,
        serial_number: None,
        last_seen_at: None,
    }
}

/// Builds a credential of the given kind.
fn credential(kind: CredentialKind) -> Credential {
    Credential {
        id: CredentialId::new("cred-1"),
        device_id: DeviceId::new("dev-lab-01"),
        kind,
        username: "svc".to_string(),
        encrypted_secret: "enc:secret".to_string(),
        private_key: None,
        public_key_fingerprint: None,
        active: true,
        rotated_at: None,
    }
}

/// Unregistered credential kinds fail closed at connect time.
#[tokio::test]
async fn test_unregistered_kind_rejected() {
    let registry = TransportRegistry::with_defaults();
    let error = registry
        .connect(
            &device("dev.example.net"),
            &credential(CredentialKind::Ssh),
            &SecretMaterial::new("secret".to_string()),
            30,
        )
        .await
        .expect_err("ssh has no registered factory");
    match error {
        TransportError::Connect(message) => assert!(message.contains("ssh"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}

/// Cleartext schemes are rejected before any request is issued.
#[tokio::test]
async fn test_http_scheme_rejected() {
    let registry = TransportRegistry::with_defaults();
    let error = registry
        .connect(
            &device("http://dev.example.net"),
            &credential(CredentialKind::Rest),
            &SecretMaterial::new("secret".to_string()),
            30,
        )
        .await
        .expect_err("cleartext scheme rejected");
    match error {
        TransportError::Connect(message) => {
            assert!(message.contains("scheme 'http' not permitted"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Garbage management addresses are rejected with a parse error.
#[tokio::test]
async fn test_invalid_address_rejected() {
    let registry = TransportRegistry::with_defaults();
    let error = registry
        .connect(
            &device("not a host"),
            &credential(CredentialKind::Rest),
            &SecretMaterial::new("secret".to_string()),
            30,
        )
        .await
        .expect_err("invalid address rejected");
    assert!(matches!(error, TransportError::Connect(_)));
}
