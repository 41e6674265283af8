// change-gate-core/src/core/job.rs
// ============================================================================
// Module: Change Gate Job Model
// Description: Tracking records for long-running apply operations.
// Purpose: Expose progress and retry accounting for plan execution.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Jobs track the execution of a plan apply. Progress is reported as a
//! percentage that only moves forward; attempts are bounded by
//! `max_attempts`. `result_summary` is structured JSON at this layer
//! regardless of how a backend chooses to store it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::DeviceId;
use crate::core::identifiers::JobId;
use crate::core::identifiers::PlanId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Job Status
// ============================================================================

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued and awaiting a worker.
    Queued,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Returns the lowercase label for the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// SECTION: Job Kind
// ============================================================================

/// Kind of work a job tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Apply an approved plan across its devices.
    ApplyPlan,
}

impl JobType {
    /// Returns the lowercase label for the job type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApplyPlan => "apply_plan",
        }
    }
}

// ============================================================================
// SECTION: Job Record
// ============================================================================

/// Tracking record for a long-running apply.
///
/// # Invariants
/// - `attempts <= max_attempts`.
/// - `progress_percent` is in `0..=100` and monotonically non-decreasing
///   until the job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: JobId,
    /// Plan the job executes, when applicable.
    pub plan_id: Option<PlanId>,
    /// Kind of work tracked.
    pub job_type: JobType,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Devices covered by the job.
    pub device_ids: Vec<DeviceId>,
    /// Attempts consumed so far.
    pub attempts: u32,
    /// Maximum attempts permitted.
    pub max_attempts: u32,
    /// Earliest instant the next attempt may run.
    pub next_run_at: Option<Timestamp>,
    /// Progress percentage in `0..=100`.
    pub progress_percent: u8,
    /// Device currently being processed.
    pub current_device_id: Option<DeviceId>,
    /// Structured result summary.
    pub result_summary: Option<Value>,
    /// Error message for failed jobs.
    pub error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

impl Job {
    /// Advances progress to `floor(100 * done / total)` without ever moving
    /// backwards. A zero `total` leaves progress untouched.
    pub fn advance_progress(&mut self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let done = done.min(total);
        let percent = (done * 100 / total).min(100);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Value is clamped to 100 before the cast."
        )]
        let percent = percent as u8;
        if percent > self.progress_percent {
            self.progress_percent = percent;
        }
    }
}
