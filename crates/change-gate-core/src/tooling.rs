// change-gate-core/src/tooling.rs
// ============================================================================
// Module: Change Gate Tool Envelopes
// Description: Wire envelopes for the tool invocation surface.
// Purpose: Render plan and apply results into the host tool protocol.
// Dependencies: crate::{apply, authz, core, families, interfaces, plan}, serde, serde_json
// ============================================================================

//! ## Overview
//! Tool responses carry human-readable content plus structured `_meta` for
//! programmatic callers. The outer tool server owns transport and schema;
//! this module owns the mapping from core results and errors onto the wire
//! shape, including the stable error-kind labels of the exposed taxonomy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::apply::ApplyError;
use crate::apply::ApplyOutcome;
use crate::apply::DeviceApplyResult;
use crate::authz::AuthzError;
use crate::core::PlanStatus;
use crate::core::RiskLevel;
use crate::core::Timestamp;
use crate::plan::PlanCreation;
use crate::plan::PlanError;
use crate::plan::TokenError;

// ============================================================================
// SECTION: Envelope Types
// ============================================================================

/// A single content block in a tool response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolContent {
    /// Human-readable text.
    pub text: String,
}

/// Tool response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    /// Content blocks shown to the operator.
    pub content: Vec<ToolContent>,
    /// Structured metadata for programmatic callers.
    #[serde(rename = "_meta")]
    pub meta: Value,
    /// Whether the response reports an error.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

/// Per-device entry in plan metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDeviceMeta {
    /// Device identifier.
    pub device_id: String,
    /// Preview payload for the device.
    pub preview: Value,
}

/// Structured metadata for a successful plan response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanMeta {
    /// Plan identifier.
    pub plan_id: String,
    /// Approval token for the subsequent apply call.
    pub approval_token: String,
    /// Token expiry instant.
    pub approval_expires_at: Timestamp,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Number of target devices.
    pub device_count: usize,
    /// Per-device previews.
    pub devices: Vec<PlanDeviceMeta>,
    /// Tool that produced the plan.
    pub tool_name: String,
}

/// Structured metadata for an apply response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyMeta {
    /// Plan identifier.
    pub plan_id: String,
    /// Devices that completed successfully.
    pub successful_count: usize,
    /// Devices that did not complete.
    pub failed_count: usize,
    /// Terminal plan status.
    pub final_status: PlanStatus,
    /// Per-device results.
    pub device_results: Vec<DeviceApplyResult>,
}

// ============================================================================
// SECTION: Success Rendering
// ============================================================================

impl ToolResponse {
    /// Renders a successful plan creation.
    #[must_use]
    pub fn from_plan(creation: &PlanCreation) -> Self {
        let plan = &creation.plan;
        let meta = PlanMeta {
            plan_id: plan.id.as_str().to_string(),
            approval_token: plan.approval_token.clone().unwrap_or_default(),
            approval_expires_at: plan.approval_expires_at.unwrap_or_default(),
            risk_level: plan.risk_level,
            device_count: plan.device_ids.len(),
            devices: creation
                .previews
                .iter()
                .map(|preview| PlanDeviceMeta {
                    device_id: preview.device_id.as_str().to_string(),
                    preview: serde_json::to_value(preview).unwrap_or(Value::Null),
                })
                .collect(),
            tool_name: plan.tool_name.as_str().to_string(),
        };
        let text = format!(
            "Plan {} created ({} risk) for {} device(s); status {}. \
             Approve and apply with the returned token before it expires.",
            plan.id,
            plan.risk_level,
            plan.device_ids.len(),
            plan.status
        );
        Self {
            content: vec![ToolContent {
                text,
            }],
            meta: serde_json::to_value(meta).unwrap_or(Value::Null),
            is_error: false,
        }
    }

    /// Renders an apply outcome (success or partial failure).
    #[must_use]
    pub fn from_apply(outcome: &ApplyOutcome) -> Self {
        let meta = ApplyMeta {
            plan_id: outcome.plan_id.as_str().to_string(),
            successful_count: outcome.successful_count,
            failed_count: outcome.failed_count,
            final_status: outcome.final_status,
            device_results: outcome.device_results.clone(),
        };
        let text = format!(
            "Plan {} finished {}: {} succeeded, {} failed.",
            outcome.plan_id, outcome.final_status, outcome.successful_count, outcome.failed_count
        );
        Self {
            content: vec![ToolContent {
                text,
            }],
            meta: serde_json::to_value(meta).unwrap_or(Value::Null),
            is_error: outcome.final_status != PlanStatus::Completed,
        }
    }

    /// Renders an error with its stable kind label.
    #[must_use]
    pub fn from_error(kind: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            content: vec![ToolContent {
                text: message.clone(),
            }],
            meta: json!({ "error_kind": kind, "message": message }),
            is_error: true,
        }
    }
}

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Stable error-kind label for a plan error.
#[must_use]
pub const fn plan_error_kind(error: &PlanError) -> &'static str {
    match error {
        PlanError::DeviceNotFound(_) => "device_not_found",
        PlanError::PlanNotFound(_) => "plan_not_found",
        PlanError::Validation(_) => "validation_error",
        PlanError::CapabilityNotAllowed {
            ..
        } => "capability_not_allowed",
        PlanError::EnvironmentNotAllowed {
            ..
        } => "environment_not_allowed",
        PlanError::Token(token) => token_error_kind(token),
        PlanError::InvalidTransition {
            ..
        } => "invalid_plan_transition",
        PlanError::Engine(_) => "engine_error",
        PlanError::Store(_) => "persistence_error",
    }
}

/// Stable error-kind label for a token error.
#[must_use]
pub const fn token_error_kind(error: &TokenError) -> &'static str {
    match error {
        TokenError::Missing => "token_missing",
        TokenError::Mismatch => "token_mismatch",
        TokenError::Expired => "token_expired",
        TokenError::PlanNotApplicable {
            ..
        } => "plan_not_applicable",
    }
}

/// Stable error-kind label for an authorization error.
#[must_use]
pub const fn authz_error_kind(error: &AuthzError) -> &'static str {
    match error {
        AuthzError::Unauthorized {
            ..
        } => "unauthorized",
        AuthzError::UnknownTool(_) => "unknown_tool",
        AuthzError::Store(_) => "persistence_error",
    }
}

/// Stable error-kind label for an apply error.
#[must_use]
pub const fn apply_error_kind(error: &ApplyError) -> &'static str {
    match error {
        ApplyError::Plan(plan) => plan_error_kind(plan),
        ApplyError::Store(_) => "persistence_error",
    }
}

/// Renders a plan error into the wire envelope.
#[must_use]
pub fn plan_error_response(error: &PlanError) -> ToolResponse {
    ToolResponse::from_error(plan_error_kind(error), error.to_string())
}

/// Renders an authorization error into the wire envelope.
#[must_use]
pub fn authz_error_response(error: &AuthzError) -> ToolResponse {
    ToolResponse::from_error(authz_error_kind(error), error.to_string())
}

/// Renders an apply error into the wire envelope.
#[must_use]
pub fn apply_error_response(error: &ApplyError) -> ToolResponse {
    ToolResponse::from_error(apply_error_kind(error), error.to_string())
}
