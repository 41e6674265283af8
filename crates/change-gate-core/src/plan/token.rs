// change-gate-core/src/plan/token.rs
// ============================================================================
// Module: Approval Tokens
// Description: Minting, fingerprinting, and constant-time token comparison.
// Purpose: Tie an approval decision to an apply call without timing leaks.
// Dependencies: rand, sha2, subtle
// ============================================================================

//! ## Overview
//! Approval tokens are opaque secrets minted from OS entropy at plan creation
//! and compared in constant time at apply. Comparison hashes both sides first
//! so unequal lengths cannot shortcut the comparison. Audit rows carry only a
//! truncated fingerprint, never the token itself.
//!
//! Security posture: minimize timing side-channels when comparing secret
//! inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::runtime::mint::hex_encode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Entropy bytes backing an approval token.
const TOKEN_ENTROPY_BYTES: usize = 32;

/// Prefix marking approval tokens in transit.
const TOKEN_PREFIX: &str = "approve-";

/// Hex characters kept in audit fingerprints.
const FINGERPRINT_CHARS: usize = 16;

// ============================================================================
// SECTION: Minting
// ============================================================================

/// Mints a fresh approval token.
#[must_use]
pub fn mint_approval_token() -> String {
    let mut bytes = [0_u8; TOKEN_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", hex_encode(&bytes))
}

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Compares a presented token against the stored token in constant time.
///
/// Both sides are hashed to a fixed width before the constant-time equality
/// check so length differences cannot leak through an early return.
#[must_use]
pub fn tokens_match(presented: &str, stored: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let stored = Sha256::digest(stored.as_bytes());
    presented.as_slice().ct_eq(stored.as_slice()).into()
}

/// Returns the truncated hex fingerprint recorded in audit metadata.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut fingerprint = hex_encode(digest.as_slice());
    fingerprint.truncate(FINGERPRINT_CHARS);
    fingerprint
}
