// change-gate-core/src/core/audit.rs
// ============================================================================
// Module: Change Gate Audit Model
// Description: Append-only audit events for every change-control decision.
// Purpose: Record who decided what, on which device, with what outcome.
// Dependencies: crate::core::{device, identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Every decision the core takes emits exactly one audit event: plan creation,
//! denial, approval, per-device apply outcomes, and plan terminal states.
//! Events are append-only and are never mutated after the fact. Writes are
//! best-effort but failures are counted and surfaced, never silently dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::device::Environment;
use crate::core::identifiers::AuditEventId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::JobId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::ToolName;
use crate::core::identifiers::UserSub;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Audit Action
// ============================================================================

/// Decision kinds recorded in the audit stream.
///
/// # Invariants
/// - Labels are stable; downstream compliance tooling matches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// A plan row was created.
    #[serde(rename = "plan.created")]
    PlanCreated,
    /// A plan request was denied before creation.
    #[serde(rename = "plan.denied")]
    PlanDenied,
    /// A plan was approved.
    #[serde(rename = "plan.approved")]
    PlanApproved,
    /// Apply started for a plan.
    #[serde(rename = "apply.started")]
    ApplyStarted,
    /// A device apply succeeded.
    #[serde(rename = "apply.device.succeeded")]
    ApplyDeviceSucceeded,
    /// A device apply failed.
    #[serde(rename = "apply.device.failed")]
    ApplyDeviceFailed,
    /// A device apply was rolled back.
    #[serde(rename = "apply.device.rolled_back")]
    ApplyDeviceRolledBack,
    /// A plan reached `completed`.
    #[serde(rename = "plan.completed")]
    PlanCompleted,
    /// A plan reached `failed`.
    #[serde(rename = "plan.failed")]
    PlanFailed,
    /// A plan reached `rolled_back`.
    #[serde(rename = "plan.rolled_back")]
    PlanRolledBack,
    /// A plan expired before apply.
    #[serde(rename = "plan.expired")]
    PlanExpired,
    /// A plan was cancelled.
    #[serde(rename = "plan.cancelled")]
    PlanCancelled,
}

impl AuditAction {
    /// Returns the stable dotted label for the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PlanCreated => "plan.created",
            Self::PlanDenied => "plan.denied",
            Self::PlanApproved => "plan.approved",
            Self::ApplyStarted => "apply.started",
            Self::ApplyDeviceSucceeded => "apply.device.succeeded",
            Self::ApplyDeviceFailed => "apply.device.failed",
            Self::ApplyDeviceRolledBack => "apply.device.rolled_back",
            Self::PlanCompleted => "plan.completed",
            Self::PlanFailed => "plan.failed",
            Self::PlanRolledBack => "plan.rolled_back",
            Self::PlanExpired => "plan.expired",
            Self::PlanCancelled => "plan.cancelled",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Audit Result
// ============================================================================

/// Outcome classification for an audited decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// The decision succeeded.
    Success,
    /// The request was denied by policy.
    Denied,
    /// The operation failed.
    Failed,
}

impl AuditResult {
    /// Returns the lowercase label for the result.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Denied => "denied",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// SECTION: Tool Tier
// ============================================================================

/// Tier classification for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolTier {
    /// Read-only inventory and status tools.
    Fundamental,
    /// Low-risk write tools.
    Advanced,
    /// Plan/apply workflow tools.
    Professional,
}

impl ToolTier {
    /// Returns the lowercase label for the tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fundamental => "fundamental",
            Self::Advanced => "advanced",
            Self::Professional => "professional",
        }
    }
}

// ============================================================================
// SECTION: Audit Event
// ============================================================================

/// Append-only audit event row.
///
/// # Invariants
/// - Events are never mutated after insertion.
/// - `user_id`, `approver_id`, and `approval_request_id` are additive,
///   nullable fields kept for backward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub id: AuditEventId,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Subject that triggered the decision.
    pub user_sub: UserSub,
    /// User identifier, when resolved.
    pub user_id: Option<String>,
    /// User email, when known.
    pub user_email: Option<String>,
    /// Role the user held at decision time.
    pub user_role: RoleName,
    /// Device the decision concerned, when applicable.
    pub device_id: Option<DeviceId>,
    /// Environment of the device, when applicable.
    pub environment: Option<Environment>,
    /// Decision kind.
    pub action: AuditAction,
    /// Tool that triggered the decision.
    pub tool_name: ToolName,
    /// Tier of the tool.
    pub tool_tier: ToolTier,
    /// Plan involved, when applicable.
    pub plan_id: Option<PlanId>,
    /// Job involved, when applicable.
    pub job_id: Option<JobId>,
    /// Subject that approved the action, when applicable.
    pub approver_id: Option<String>,
    /// Approval request involved, when applicable.
    pub approval_request_id: Option<String>,
    /// Outcome classification.
    pub result: AuditResult,
    /// Structured event metadata.
    pub meta: Value,
    /// Error message for failed outcomes.
    pub error_message: Option<String>,
}

// ============================================================================
// SECTION: Audit Event Params
// ============================================================================

/// Inputs required to construct an audit event.
#[derive(Debug, Clone)]
pub struct AuditEventParams {
    /// Subject that triggered the decision.
    pub user_sub: UserSub,
    /// User identifier, when resolved.
    pub user_id: Option<String>,
    /// User email, when known.
    pub user_email: Option<String>,
    /// Role the user held at decision time.
    pub user_role: RoleName,
    /// Device the decision concerned, when applicable.
    pub device_id: Option<DeviceId>,
    /// Environment of the device, when applicable.
    pub environment: Option<Environment>,
    /// Decision kind.
    pub action: AuditAction,
    /// Tool that triggered the decision.
    pub tool_name: ToolName,
    /// Tier of the tool.
    pub tool_tier: ToolTier,
    /// Plan involved, when applicable.
    pub plan_id: Option<PlanId>,
    /// Job involved, when applicable.
    pub job_id: Option<JobId>,
    /// Subject that approved the action, when applicable.
    pub approver_id: Option<String>,
    /// Approval request involved, when applicable.
    pub approval_request_id: Option<String>,
    /// Outcome classification.
    pub result: AuditResult,
    /// Structured event metadata.
    pub meta: Value,
    /// Error message for failed outcomes.
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// Builds an event from its identifier, timestamp, and params.
    #[must_use]
    pub fn new(id: AuditEventId, timestamp: Timestamp, params: AuditEventParams) -> Self {
        Self {
            id,
            timestamp,
            user_sub: params.user_sub,
            user_id: params.user_id,
            user_email: params.user_email,
            user_role: params.user_role,
            device_id: params.device_id,
            environment: params.environment,
            action: params.action,
            tool_name: params.tool_name,
            tool_tier: params.tool_tier,
            plan_id: params.plan_id,
            job_id: params.job_id,
            approver_id: params.approver_id,
            approval_request_id: params.approval_request_id,
            result: params.result,
            meta: params.meta,
            error_message: params.error_message,
        }
    }
}
