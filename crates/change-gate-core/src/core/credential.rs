// change-gate-core/src/core/credential.rs
// ============================================================================
// Module: Change Gate Credential Model
// Description: Encrypted device credentials and decrypted secret material.
// Purpose: Model credential records and bound the lifetime of plaintext secrets.
// Dependencies: crate::core::{identifiers, time}, serde, zeroize
// ============================================================================

//! ## Overview
//! Credential records store ciphertext only; decryption happens through the
//! [`crate::interfaces::SecretCipher`] seam immediately before a transport is
//! opened. Decrypted material lives in [`SecretMaterial`], which zeroizes on
//! drop and never reveals its contents through `Debug` output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use zeroize::Zeroize;
use zeroize::ZeroizeOnDrop;

use crate::core::identifiers::CredentialId;
use crate::core::identifiers::DeviceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Credential Kind
// ============================================================================

/// Authentication mechanism a credential supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Username/password for the device REST API.
    Rest,
    /// Username/password for interactive SSH.
    Ssh,
    /// SSH private-key authentication for RouterOS devices.
    RouterosSshKey,
}

impl CredentialKind {
    /// Returns the lowercase label for the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Ssh => "ssh",
            Self::RouterosSshKey => "routeros_ssh_key",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Credential Record
// ============================================================================

/// Encrypted credential record owned by the credential store.
///
/// # Invariants
/// - At most one active credential exists per `(device_id, kind)` pair.
/// - `encrypted_secret` and `private_key` hold ciphertext only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential identifier.
    pub id: CredentialId,
    /// Device the credential authenticates against.
    pub device_id: DeviceId,
    /// Authentication mechanism.
    pub kind: CredentialKind,
    /// Username presented to the device.
    pub username: String,
    /// Encrypted secret (password or passphrase).
    pub encrypted_secret: String,
    /// Encrypted SSH private key, for key-based kinds.
    pub private_key: Option<String>,
    /// Public key fingerprint used for key verification.
    pub public_key_fingerprint: Option<String>,
    /// Whether this credential is the active one for its kind.
    pub active: bool,
    /// Timestamp of the last rotation.
    pub rotated_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Secret Material
// ============================================================================

/// Decrypted secret material with a bounded in-memory lifetime.
///
/// # Invariants
/// - Contents are zeroized on drop.
/// - `Debug` output never contains the secret bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial(String);

impl SecretMaterial {
    /// Wraps decrypted secret material.
    #[must_use]
    pub const fn new(secret: String) -> Self {
        Self(secret)
    }

    /// Exposes the secret for immediate use at a transport boundary.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretMaterial(REDACTED)")
    }
}
