// change-gate-core/src/core/health.rs
// ============================================================================
// Module: Change Gate Health Checks
// Description: Post-change device health samples.
// Purpose: Persist the health evidence that gated a rollback decision.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! After every mutation the executor samples the device's system resources.
//! The sample both gates the rollback decision and is persisted so operators
//! can see what the device looked like immediately after a change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DeviceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Health Status
// ============================================================================

/// Outcome of a post-change health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The device responded and the mutated collection verified.
    Healthy,
    /// The device responded but the check did not verify.
    Failed,
}

impl HealthStatus {
    /// Returns the lowercase label for the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// SECTION: Health Check Record
// ============================================================================

/// Post-change health sample for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Record identifier.
    pub id: String,
    /// Sampled device.
    pub device_id: DeviceId,
    /// Sample timestamp.
    pub timestamp: Timestamp,
    /// Check outcome.
    pub status: HealthStatus,
    /// CPU load percentage, when reported.
    pub cpu_usage_percent: Option<f64>,
    /// Memory in use in bytes, when reported.
    pub memory_used_bytes: Option<i64>,
    /// Total memory in bytes, when reported.
    pub memory_total_bytes: Option<i64>,
    /// Uptime in seconds, when reported numerically.
    pub uptime_seconds: Option<i64>,
    /// Failure detail for failed checks.
    pub error_message: Option<String>,
}
