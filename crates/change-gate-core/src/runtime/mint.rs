// change-gate-core/src/runtime/mint.rs
// ============================================================================
// Module: Change Gate Identifier Minting
// Description: Random identifier generation for plans, jobs, and audit rows.
// Purpose: Produce collision-resistant, prefixed identifiers from OS entropy.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings of the form `<prefix>-<hex>`, minted from OS
//! entropy. Approval tokens use a longer form minted in the plan service; this
//! module only covers row identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use rand::RngCore;
use rand::rngs::OsRng;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Entropy bytes backing a row identifier.
const ID_ENTROPY_BYTES: usize = 8;

// ============================================================================
// SECTION: Minting
// ============================================================================

/// Mints a prefixed random identifier such as `plan-1f2e3d4c5b6a7988`.
#[must_use]
pub fn random_id(prefix: &str) -> String {
    let mut bytes = [0_u8; ID_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}-{}", hex_encode(&bytes))
}

/// Encodes bytes as lowercase hex.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
