// change-gate-core/src/core/time.rs
// ============================================================================
// Module: Change Gate Time Model
// Description: Canonical timestamp representation for plans, jobs, and audit.
// Purpose: Provide explicit time values with deterministic arithmetic.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Change Gate embeds explicit unix-millisecond timestamps in every record.
//! The core never reads wall-clock time directly; services obtain time through
//! the [`crate::interfaces::Clock`] seam so tests can replay exact instants
//! (token-expiry boundaries depend on this).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Arithmetic saturates instead of wrapping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(&self) -> i64 {
        self.0
    }

    /// Returns the timestamp advanced by the given number of seconds.
    #[must_use]
    pub const fn saturating_add_seconds(&self, seconds: u64) -> Self {
        let millis = (seconds as i64).saturating_mul(1_000);
        Self(self.0.saturating_add(millis))
    }

    /// Returns the timestamp advanced by the given number of milliseconds.
    #[must_use]
    pub const fn saturating_add_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
