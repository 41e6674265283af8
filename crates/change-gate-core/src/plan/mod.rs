// change-gate-core/src/plan/mod.rs
// ============================================================================
// Module: Change Gate Plan Service
// Description: Plan creation pipeline, guarded transitions, token validation.
// Purpose: Drive the plan phase: validate, gate, assess, preview, persist.
// Dependencies: crate::{authz, core, families, interfaces, runtime}, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The plan service owns the plan phase of the workflow. `plan_change` runs
//! the full pipeline (validation, capability and environment gates, risk
//! classification, previews) and then persists through `create_plan`, which
//! mints the plan id and approval token. Status transitions are guarded by
//! the plan state machine and serialized per plan through an optimistic
//! pre-image check in the store.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod token;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::authz::AuthzContext;
use crate::core::AuditAction;
use crate::core::AuditEventParams;
use crate::core::AuditResult;
use crate::core::Device;
use crate::core::DevicePreview;
use crate::core::DeviceId;
use crate::core::DeviceRunStatus;
use crate::core::Environment;
use crate::core::Plan;
use crate::core::PlanChanges;
use crate::core::PlanId;
use crate::core::PlanStatus;
use crate::core::PreCheckStatus;
use crate::core::RiskLevel;
use crate::core::RoleName;
use crate::core::ToolName;
use crate::core::ToolTier;
use crate::core::UserSub;
use crate::families::EngineError;
use crate::families::ValidationError;
use crate::families::engine_for;
use crate::interfaces::Clock;
use crate::interfaces::DeviceStore;
use crate::interfaces::PlanStore;
use crate::interfaces::StoreError;
use crate::plan::token::mint_approval_token;
use crate::plan::token::token_fingerprint;
use crate::plan::token::tokens_match;
use crate::runtime::mint::hex_encode;
use crate::runtime::mint::random_id;
use crate::runtime::recorder::AuditRecorder;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Plan-phase policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSettings {
    /// Approval token lifetime in seconds.
    pub approval_ttl_seconds: u64,
    /// When true, production devices reject every write family.
    pub prod_write_default_denied: bool,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            approval_ttl_seconds: 900,
            prod_write_default_denied: true,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token validation failures, surfaced as distinct kinds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The plan has no active approval token.
    #[error("plan has no active approval token")]
    Missing,
    /// The presented token does not match the stored token.
    #[error("approval token mismatch")]
    Mismatch,
    /// The token expired before the apply call.
    #[error("approval token expired")]
    Expired,
    /// The plan status does not admit an apply.
    #[error("plan status '{status}' is not applicable")]
    PlanNotApplicable {
        /// Status the plan was found in.
        status: PlanStatus,
    },
}

/// Plan service errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A target device does not exist.
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),
    /// A plan does not exist.
    #[error("plan not found: {0}")]
    PlanNotFound(PlanId),
    /// Change payload validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A required capability flag is not set on a target device.
    #[error(
        "device '{device_id}' is missing the {family} write capability: \
         '{required_capability}' is {current_value}; writes are permitted in: {allowed}",
        allowed = .allowed_environments.iter().map(Environment::as_str).collect::<Vec<_>>().join(", ")
    )]
    CapabilityNotAllowed {
        /// Device missing the flag.
        device_id: DeviceId,
        /// Family label for the message.
        family: &'static str,
        /// Capability flag that was required.
        required_capability: &'static str,
        /// Current flag value.
        current_value: bool,
        /// Environments where the operation is permitted.
        allowed_environments: Vec<Environment>,
    },
    /// The device environment blocks the operation.
    #[error(
        "device '{device_id}' is in the {device_environment} environment; \
         '{operation}' is only allowed in: {allowed}",
        allowed = .allowed_environments.iter().map(Environment::as_str).collect::<Vec<_>>().join(", ")
    )]
    EnvironmentNotAllowed {
        /// Device in the restricted environment.
        device_id: DeviceId,
        /// Environment of the device.
        device_environment: Environment,
        /// Environments where the operation is permitted.
        allowed_environments: Vec<Environment>,
        /// Operation that was attempted.
        operation: &'static str,
    },
    /// Token validation failed.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// A status transition outside the state machine was requested.
    #[error("invalid plan transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the plan was in.
        from: PlanStatus,
        /// Status that was requested.
        to: PlanStatus,
    },
    /// A family engine rejected the payload.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Actor Info
// ============================================================================

/// Caller identity recorded on audit rows.
#[derive(Debug, Clone)]
pub struct ActorInfo {
    /// Subject of the actor.
    pub sub: UserSub,
    /// User identifier, when resolved.
    pub user_id: Option<String>,
    /// Email, when known.
    pub email: Option<String>,
    /// Role held at decision time.
    pub role: RoleName,
}

impl ActorInfo {
    /// Builds the internal system actor for service-initiated transitions.
    #[must_use]
    pub fn system() -> Self {
        Self {
            sub: UserSub::new("system"),
            user_id: None,
            email: None,
            role: RoleName::new("system"),
        }
    }
}

impl From<&AuthzContext> for ActorInfo {
    fn from(ctx: &AuthzContext) -> Self {
        Self {
            sub: ctx.user.sub.clone(),
            user_id: Some(ctx.user.sub.as_str().to_string()),
            email: ctx.user.email.clone(),
            role: ctx.user.role_name.clone(),
        }
    }
}

// ============================================================================
// SECTION: Requests and Results
// ============================================================================

/// Tool-facing request for the plan pipeline.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Target device identifiers.
    pub device_ids: Vec<DeviceId>,
    /// Human-readable summary.
    pub summary: String,
    /// Structured change payload.
    pub changes: PlanChanges,
    /// Devices processed per batch; 0 selects the configured default.
    pub batch_size: u32,
    /// Pause between batches in seconds; 0 selects the configured default.
    pub pause_seconds_between_batches: u64,
    /// Whether failed devices are rolled back from their snapshots.
    pub rollback_on_failure: bool,
}

/// Result of the plan pipeline: the persisted plan and its previews.
#[derive(Debug, Clone)]
pub struct PlanCreation {
    /// Persisted plan in `pending`.
    pub plan: Plan,
    /// Per-device previews in target order.
    pub previews: Vec<DevicePreview>,
}

// ============================================================================
// SECTION: Plan Service
// ============================================================================

/// Plan-phase service: creation pipeline, fetch, transitions, tokens.
pub struct PlanService {
    /// Device registry reads.
    devices: Arc<dyn DeviceStore + Send + Sync>,
    /// Plan persistence.
    plans: Arc<dyn PlanStore + Send + Sync>,
    /// Time source.
    clock: Arc<dyn Clock + Send + Sync>,
    /// Audit recorder.
    recorder: Arc<AuditRecorder>,
    /// Plan-phase policy settings.
    settings: PlanSettings,
}

impl PlanService {
    /// Creates the service over its stores, clock, recorder, and settings.
    #[must_use]
    pub fn new(
        devices: Arc<dyn DeviceStore + Send + Sync>,
        plans: Arc<dyn PlanStore + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        recorder: Arc<AuditRecorder>,
        settings: PlanSettings,
    ) -> Self {
        Self {
            devices,
            plans,
            clock,
            recorder,
            settings,
        }
    }

    /// Runs the full plan pipeline for an authorized tool call.
    ///
    /// Validation, capability gating, environment gating, risk classification,
    /// and preview rendering all happen before anything is persisted; a
    /// failure leaves no plan row behind.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] for validation, gating, resolution, or
    /// persistence failures.
    pub fn plan_change(
        &self,
        ctx: &AuthzContext,
        request: PlanRequest,
    ) -> Result<PlanCreation, PlanError> {
        let family = request.changes.family();
        if ctx.tool.family != family {
            return Err(ValidationError::single(
                "operation",
                format!(
                    "tool '{}' does not accept '{}' operations",
                    ctx.tool.name,
                    request.changes.operation()
                ),
            )
            .into());
        }
        let engine = engine_for(family);
        engine.validate(&request.changes)?;

        let mut devices = Vec::with_capacity(request.device_ids.len());
        for device_id in &request.device_ids {
            let device = self
                .devices
                .get_device(device_id)?
                .ok_or_else(|| PlanError::DeviceNotFound(device_id.clone()))?;
            devices.push(device);
        }

        for device in &devices {
            self.check_gates(device, &request.changes)?;
        }

        let risk_level = devices
            .iter()
            .map(|device| engine.assess_risk(&request.changes, device.environment))
            .max()
            .unwrap_or(RiskLevel::Medium);

        let mut previews = Vec::with_capacity(devices.len());
        let mut pre_check_results = BTreeMap::new();
        for device in &devices {
            let preview = engine.preview(device, &request.changes)?;
            pre_check_results.insert(device.id.clone(), PreCheckStatus::Passed);
            previews.push(DevicePreview {
                device_id: device.id.clone(),
                name: device.name.clone(),
                environment: device.environment,
                operation: request.changes.operation().to_string(),
                pre_check_status: PreCheckStatus::Passed,
                preview,
            });
        }

        let plan = self.create_plan(ctx, request, risk_level, pre_check_results)?;
        Ok(PlanCreation {
            plan,
            previews,
        })
    }

    /// Persists a validated plan in `pending`, minting its id and token.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Store`] when persistence fails, including a
    /// conflict on the approval token uniqueness constraint.
    pub fn create_plan(
        &self,
        ctx: &AuthzContext,
        request: PlanRequest,
        risk_level: RiskLevel,
        pre_check_results: BTreeMap<DeviceId, PreCheckStatus>,
    ) -> Result<Plan, PlanError> {
        let now = self.clock.now();
        let approval_token = mint_approval_token();
        let device_statuses = request
            .device_ids
            .iter()
            .map(|device_id| (device_id.clone(), DeviceRunStatus::Pending))
            .collect();

        let plan = Plan {
            id: PlanId::new(random_id("plan")),
            created_by: ctx.user.sub.clone(),
            tool_name: ToolName::new(ctx.tool.name),
            status: PlanStatus::Pending,
            device_ids: request.device_ids,
            summary: request.summary,
            changes: request.changes,
            risk_level,
            approved_by: None,
            approved_at: None,
            approval_token: Some(approval_token.clone()),
            approval_token_timestamp: Some(now),
            approval_expires_at: Some(
                now.saturating_add_seconds(self.settings.approval_ttl_seconds),
            ),
            batch_size: request.batch_size,
            pause_seconds_between_batches: request.pause_seconds_between_batches,
            rollback_on_failure: request.rollback_on_failure,
            device_statuses,
            pre_check_results,
            created_at: now,
            updated_at: now,
        };
        self.plans.insert_plan(&plan)?;

        let actor = ActorInfo::from(ctx);
        self.recorder.record(AuditEventParams {
            user_sub: actor.sub,
            user_id: actor.user_id,
            user_email: actor.email,
            user_role: actor.role,
            device_id: None,
            environment: None,
            action: AuditAction::PlanCreated,
            tool_name: plan.tool_name.clone(),
            tool_tier: ctx.tool.tier,
            plan_id: Some(plan.id.clone()),
            job_id: None,
            approver_id: None,
            approval_request_id: None,
            result: AuditResult::Success,
            meta: json!({
                "risk_level": plan.risk_level,
                "device_count": plan.device_ids.len(),
                "devices": plan.device_ids,
                "operation": plan.changes.operation(),
                "changes_hash": changes_hash(&plan.changes),
                "token_fingerprint": token_fingerprint(&approval_token),
            }),
            error_message: None,
        });

        Ok(plan)
    }

    /// Fetches a plan by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::PlanNotFound`] for unknown plans and
    /// [`PlanError::Store`] on read failure.
    pub fn get_plan(&self, plan_id: &PlanId) -> Result<Plan, PlanError> {
        self.plans
            .get_plan(plan_id)?
            .ok_or_else(|| PlanError::PlanNotFound(plan_id.clone()))
    }

    /// Transitions a plan to a new status under the state machine.
    ///
    /// The store re-checks the loaded pre-image status, so concurrent
    /// transitions serialize per plan: the loser observes a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidTransition`] for illegal transitions and
    /// [`PlanError::Store`] when the optimistic check or write fails.
    pub fn update_plan_status(
        &self,
        plan_id: &PlanId,
        new_status: PlanStatus,
        actor: &ActorInfo,
        tool_tier: ToolTier,
    ) -> Result<Plan, PlanError> {
        let plan = self.get_plan(plan_id)?;
        if !plan.status.can_transition_to(new_status) {
            return Err(PlanError::InvalidTransition {
                from: plan.status,
                to: new_status,
            });
        }
        let approved_by =
            (new_status == PlanStatus::Approved).then(|| actor.sub.clone());
        let updated = self.plans.transition_plan_status(
            plan_id,
            plan.status,
            new_status,
            approved_by.as_ref(),
            self.clock.now(),
        )?;

        if let Some(action) = audit_action_for(new_status) {
            self.recorder.record(AuditEventParams {
                user_sub: actor.sub.clone(),
                user_id: actor.user_id.clone(),
                user_email: actor.email.clone(),
                user_role: actor.role.clone(),
                device_id: None,
                environment: None,
                action,
                tool_name: updated.tool_name.clone(),
                tool_tier,
                plan_id: Some(updated.id.clone()),
                job_id: None,
                approver_id: (new_status == PlanStatus::Approved)
                    .then(|| actor.sub.as_str().to_string()),
                approval_request_id: None,
                result: AuditResult::Success,
                meta: json!({ "from": plan.status, "to": new_status }),
                error_message: None,
            });
        }
        Ok(updated)
    }

    /// Validates a presented approval token against a plan.
    ///
    /// # Errors
    ///
    /// Returns a distinct [`TokenError`] kind for a missing token, a
    /// mismatch, an expired token, or a non-applicable plan status.
    pub fn validate_approval_token(
        &self,
        plan: &Plan,
        presented_token: &str,
    ) -> Result<(), TokenError> {
        if !matches!(plan.status, PlanStatus::Pending | PlanStatus::Approved) {
            return Err(TokenError::PlanNotApplicable {
                status: plan.status,
            });
        }
        let Some(stored) = plan.approval_token.as_deref() else {
            return Err(TokenError::Missing);
        };
        if !tokens_match(presented_token, stored) {
            return Err(TokenError::Mismatch);
        }
        let expires_at = plan.approval_expires_at.ok_or(TokenError::Missing)?;
        if self.clock.now() > expires_at {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    /// Expires a plan whose approval window elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when the transition is illegal or fails.
    pub fn expire_plan(&self, plan_id: &PlanId) -> Result<Plan, PlanError> {
        self.update_plan_status(
            plan_id,
            PlanStatus::Expired,
            &ActorInfo::system(),
            ToolTier::Professional,
        )
    }

    /// Cancels a plan on operator request.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when the transition is illegal or fails.
    pub fn cancel_plan(&self, plan_id: &PlanId, actor: &ActorInfo) -> Result<Plan, PlanError> {
        self.update_plan_status(plan_id, PlanStatus::Cancelled, actor, ToolTier::Professional)
    }

    /// Applies the capability and environment gates to one device.
    fn check_gates(&self, device: &Device, changes: &PlanChanges) -> Result<(), PlanError> {
        let family = changes.family();
        if !device.capabilities.allows(family) {
            return Err(PlanError::CapabilityNotAllowed {
                device_id: device.id.clone(),
                family: family.as_str(),
                required_capability: family.required_capability(),
                current_value: device.capabilities.allows(family),
                allowed_environments: family.allowed_environments().to_vec(),
            });
        }
        if device.environment == Environment::Prod && self.settings.prod_write_default_denied {
            return Err(PlanError::EnvironmentNotAllowed {
                device_id: device.id.clone(),
                device_environment: device.environment,
                allowed_environments: family.allowed_environments().to_vec(),
                operation: changes.operation(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the canonical-JSON hash of the change payload for audit metadata.
fn changes_hash(changes: &PlanChanges) -> Option<String> {
    let bytes = serde_jcs::to_vec(changes).ok()?;
    Some(hex_encode(Sha256::digest(&bytes).as_slice()))
}

/// Maps a status transition target to its audit action.
const fn audit_action_for(status: PlanStatus) -> Option<AuditAction> {
    match status {
        PlanStatus::Approved => Some(AuditAction::PlanApproved),
        PlanStatus::Executing => Some(AuditAction::ApplyStarted),
        PlanStatus::Completed => Some(AuditAction::PlanCompleted),
        PlanStatus::Failed => Some(AuditAction::PlanFailed),
        PlanStatus::RolledBack => Some(AuditAction::PlanRolledBack),
        PlanStatus::Expired => Some(AuditAction::PlanExpired),
        PlanStatus::Cancelled => Some(AuditAction::PlanCancelled),
        PlanStatus::Pending => None,
    }
}
