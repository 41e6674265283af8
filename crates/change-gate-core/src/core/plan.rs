// change-gate-core/src/core/plan.rs
// ============================================================================
// Module: Change Gate Plan Model
// Description: Plan records, lifecycle statuses, risk levels, device outcomes.
// Purpose: Capture the approval-gated unit of change across one or more devices.
// Dependencies: crate::core::{changes, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A plan is a proposed set of changes awaiting approval. Plans move through a
//! guarded state machine and become immutable once terminal. Per-device apply
//! outcomes accumulate in `device_statuses`; the plan's terminal status is the
//! merge of those outcomes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::changes::PlanChanges;
use crate::core::changes::PreCheckStatus;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::ToolName;
use crate::core::identifiers::UserSub;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Risk Level
// ============================================================================

/// Risk classification assigned during planning.
///
/// # Invariants
/// - Ordering places `Medium` below `High` so merges can take the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Routine change with bounded blast radius.
    Medium,
    /// Change affecting management exposure or production traffic.
    High,
}

impl RiskLevel {
    /// Returns the lowercase label for the risk level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Plan Status
// ============================================================================

/// Plan lifecycle status.
///
/// # Invariants
/// - Transitions are only legal along [`PlanStatus::can_transition_to`].
/// - Terminal statuses admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Created and awaiting approval.
    Pending,
    /// Approved and awaiting apply.
    Approved,
    /// Apply in progress.
    Executing,
    /// Every device completed successfully.
    Completed,
    /// At least one device failed without rollback.
    Failed,
    /// At least one device was rolled back.
    RolledBack,
    /// Approval window elapsed before apply.
    Expired,
    /// Cancelled by an operator.
    Cancelled,
}

impl PlanStatus {
    /// Returns the lowercase label for the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true when the status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RolledBack | Self::Expired | Self::Cancelled
        )
    }

    /// Returns true when the transition to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(
                next,
                Self::Approved | Self::Executing | Self::Expired | Self::Cancelled
            ),
            Self::Approved => matches!(next, Self::Executing | Self::Expired | Self::Cancelled),
            Self::Executing => matches!(
                next,
                Self::Completed | Self::Failed | Self::RolledBack | Self::Cancelled
            ),
            Self::Completed | Self::Failed | Self::RolledBack | Self::Expired | Self::Cancelled => {
                false
            }
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Device Run Status
// ============================================================================

/// Per-device apply outcome tracked on the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRunStatus {
    /// Device has not been processed yet.
    Pending,
    /// Device apply is in flight.
    InProgress,
    /// Device apply completed and passed the health check.
    Completed,
    /// Device apply failed and was not rolled back.
    Failed,
    /// Device apply failed and the snapshot was restored.
    RolledBack,
    /// Rollback itself failed; the device needs manual attention.
    RollbackFailed,
}

impl DeviceRunStatus {
    /// Returns the lowercase label for the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::RollbackFailed => "rollback_failed",
        }
    }

    /// Returns true when the device outcome is final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RolledBack | Self::RollbackFailed
        )
    }
}

// ============================================================================
// SECTION: Plan Record
// ============================================================================

/// Approval-gated change plan owned by the plan service.
///
/// # Invariants
/// - `approval_token` is unique across plans and never reused.
/// - `device_statuses` keys are a subset of `device_ids`.
/// - The record is immutable once `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// Subject that created the plan.
    pub created_by: UserSub,
    /// Tool that produced the plan.
    pub tool_name: ToolName,
    /// Lifecycle status.
    pub status: PlanStatus,
    /// Target device identifiers.
    pub device_ids: Vec<DeviceId>,
    /// Human-readable summary.
    pub summary: String,
    /// Structured change payload.
    pub changes: PlanChanges,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Subject that approved the plan.
    pub approved_by: Option<UserSub>,
    /// Approval timestamp.
    pub approved_at: Option<Timestamp>,
    /// Opaque approval token; cleared only when the plan is created without one.
    pub approval_token: Option<String>,
    /// Timestamp the token was minted.
    pub approval_token_timestamp: Option<Timestamp>,
    /// Instant after which the token is rejected.
    pub approval_expires_at: Option<Timestamp>,
    /// Devices processed per batch; 0 selects the configured default.
    pub batch_size: u32,
    /// Pause between batches in seconds; 0 selects the configured default.
    pub pause_seconds_between_batches: u64,
    /// Whether a failed device is rolled back from its snapshot.
    pub rollback_on_failure: bool,
    /// Per-device apply outcomes.
    pub device_statuses: BTreeMap<DeviceId, DeviceRunStatus>,
    /// Per-device pre-check outcomes captured during planning.
    pub pre_check_results: BTreeMap<DeviceId, PreCheckStatus>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}
