// change-gate-core/src/authz/mod.rs
// ============================================================================
// Module: Change Gate Authorization
// Description: RBAC resolution and per-user device scope enforcement.
// Purpose: Gate every tool call before any state is touched.
// Dependencies: crate::core, crate::interfaces, crate::runtime, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Authorization is fail-closed: the caller must be an active user whose role
//! expands to a permission covering every target device (by id or wildcard),
//! and every target must fall inside the user's device scope. Denials are
//! audited before the error is surfaced, and the reason is never masked.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::AuditAction;
use crate::core::AuditEventParams;
use crate::core::AuditResult;
use crate::core::DeviceId;
use crate::core::PermissionAction;
use crate::core::ResourceType;
use crate::core::RoleName;
use crate::core::ToolFamily;
use crate::core::ToolName;
use crate::core::ToolTier;
use crate::core::User;
use crate::core::UserSub;
use crate::core::rbac::Role;
use crate::interfaces::RbacStore;
use crate::interfaces::StoreError;
use crate::interfaces::UserStore;
use crate::runtime::recorder::AuditRecorder;

// ============================================================================
// SECTION: Tool Registry
// ============================================================================

/// Registry entry describing the permission a tool requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    /// Tool name on the invocation surface.
    pub name: &'static str,
    /// Write family the tool belongs to.
    pub family: ToolFamily,
    /// Resource type the permission must target.
    pub resource_type: ResourceType,
    /// Action the permission must grant.
    pub action: PermissionAction,
    /// Tier recorded on audit events.
    pub tier: ToolTier,
}

/// Tool registry: every plan/apply tool and the permission it requires.
///
/// Plan tools require `device:write`; apply tools require `device:execute`.
pub const TOOL_REGISTRY: &[ToolSpec] = &[
    ToolSpec {
        name: "plan_add_firewall_rule",
        family: ToolFamily::Firewall,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_modify_firewall_rule",
        family: ToolFamily::Firewall,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_remove_firewall_rule",
        family: ToolFamily::Firewall,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "apply_firewall_plan",
        family: ToolFamily::Firewall,
        resource_type: ResourceType::Device,
        action: PermissionAction::Execute,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_add_static_route",
        family: ToolFamily::Routing,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_remove_static_route",
        family: ToolFamily::Routing,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "apply_routing_plan",
        family: ToolFamily::Routing,
        resource_type: ResourceType::Device,
        action: PermissionAction::Execute,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_set_wireless_interface",
        family: ToolFamily::Wireless,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "apply_wireless_plan",
        family: ToolFamily::Wireless,
        resource_type: ResourceType::Device,
        action: PermissionAction::Execute,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_add_dhcp_lease",
        family: ToolFamily::Dhcp,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_remove_dhcp_lease",
        family: ToolFamily::Dhcp,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "apply_dhcp_plan",
        family: ToolFamily::Dhcp,
        resource_type: ResourceType::Device,
        action: PermissionAction::Execute,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_add_bridge_vlan",
        family: ToolFamily::Bridge,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "plan_remove_bridge_vlan",
        family: ToolFamily::Bridge,
        resource_type: ResourceType::Device,
        action: PermissionAction::Write,
        tier: ToolTier::Professional,
    },
    ToolSpec {
        name: "apply_bridge_plan",
        family: ToolFamily::Bridge,
        resource_type: ResourceType::Device,
        action: PermissionAction::Execute,
        tier: ToolTier::Professional,
    },
];

/// Looks up the registry entry for a tool name.
#[must_use]
pub fn tool_spec(tool_name: &ToolName) -> Option<&'static ToolSpec> {
    TOOL_REGISTRY.iter().find(|spec| spec.name == tool_name.as_str())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authorization errors.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The caller is not authorized for the requested tool and devices.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Human-readable denial reason.
        reason: String,
        /// Permission that was required but missing.
        missing_permission: Option<String>,
        /// Devices outside the caller's scope.
        out_of_scope_devices: Vec<DeviceId>,
    },
    /// The tool name is not registered.
    #[error("unknown tool '{0}'")]
    UnknownTool(ToolName),
    /// A store read failed during resolution.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Authorization Context
// ============================================================================

/// Resolved caller context handed to downstream services on success.
#[derive(Debug, Clone)]
pub struct AuthzContext {
    /// Authenticated user record.
    pub user: User,
    /// Resolved role record.
    pub role: Role,
    /// Registry entry for the invoked tool.
    pub tool: &'static ToolSpec,
}

// ============================================================================
// SECTION: Authorization Gate
// ============================================================================

/// RBAC gate evaluated before any persistence mutation.
pub struct AuthorizationGate {
    /// User record retrieval.
    users: Arc<dyn UserStore + Send + Sync>,
    /// Role and permission retrieval.
    rbac: Arc<dyn RbacStore + Send + Sync>,
    /// Recorder receiving `plan.denied` events.
    recorder: Arc<AuditRecorder>,
}

impl AuthorizationGate {
    /// Creates a gate over the given stores and recorder.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore + Send + Sync>,
        rbac: Arc<dyn RbacStore + Send + Sync>,
        recorder: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            users,
            rbac,
            recorder,
        }
    }

    /// Authorizes a tool call against its target devices.
    ///
    /// Denials are audited as `plan.denied` before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Unauthorized`] on any policy failure,
    /// [`AuthzError::UnknownTool`] for unregistered tools, and
    /// [`AuthzError::Store`] when resolution reads fail.
    pub fn authorize(
        &self,
        user_sub: &UserSub,
        tool_name: &ToolName,
        device_ids: &[DeviceId],
    ) -> Result<AuthzContext, AuthzError> {
        let Some(tool) = tool_spec(tool_name) else {
            return Err(AuthzError::UnknownTool(tool_name.clone()));
        };

        let user = self.users.get_user(user_sub)?;
        let Some(user) = user else {
            return Err(self.deny(
                user_sub,
                None,
                tool_name,
                tool,
                format!("unknown user '{user_sub}'"),
                None,
                Vec::new(),
            ));
        };
        if !user.is_active {
            return Err(self.deny(
                user_sub,
                Some(&user),
                tool_name,
                tool,
                format!("user '{user_sub}' is inactive"),
                None,
                Vec::new(),
            ));
        }

        let Some(role) = self.rbac.role_by_name(&user.role_name)? else {
            return Err(self.deny(
                user_sub,
                Some(&user),
                tool_name,
                tool,
                format!("role '{}' does not exist", user.role_name),
                None,
                Vec::new(),
            ));
        };
        let permissions = self.rbac.permissions_for_role(&role.name)?;

        let missing: Vec<&DeviceId> = device_ids
            .iter()
            .filter(|device_id| {
                !permissions.iter().any(|permission| {
                    permission.resource_type == tool.resource_type
                        && permission.action == tool.action
                        && permission.covers(device_id.as_str())
                })
            })
            .collect();
        if let Some(device_id) = missing.first() {
            let required = format!(
                "{}:{} on {}",
                tool.resource_type.as_str(),
                tool.action.as_str(),
                device_id
            );
            return Err(self.deny(
                user_sub,
                Some(&user),
                tool_name,
                tool,
                format!("role '{}' lacks permission {required}", role.name),
                Some(required),
                Vec::new(),
            ));
        }

        let out_of_scope: Vec<DeviceId> = device_ids
            .iter()
            .filter(|device_id| !user.in_scope(device_id))
            .cloned()
            .collect();
        if !out_of_scope.is_empty() {
            let listed = out_of_scope
                .iter()
                .map(DeviceId::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(self.deny(
                user_sub,
                Some(&user),
                tool_name,
                tool,
                format!("devices outside user scope: {listed}"),
                None,
                out_of_scope,
            ));
        }

        Ok(AuthzContext {
            user,
            role,
            tool,
        })
    }

    /// Records a `plan.denied` audit event and builds the error.
    #[allow(
        clippy::too_many_arguments,
        reason = "Denial context is assembled in one place to keep call sites uniform."
    )]
    fn deny(
        &self,
        user_sub: &UserSub,
        user: Option<&User>,
        tool_name: &ToolName,
        tool: &'static ToolSpec,
        reason: String,
        missing_permission: Option<String>,
        out_of_scope_devices: Vec<DeviceId>,
    ) -> AuthzError {
        self.recorder.record(AuditEventParams {
            user_sub: user_sub.clone(),
            user_id: user.map(|u| u.sub.as_str().to_string()),
            user_email: user.and_then(|u| u.email.clone()),
            user_role: user
                .map_or_else(|| RoleName::new("unknown"), |u| u.role_name.clone()),
            device_id: None,
            environment: None,
            action: AuditAction::PlanDenied,
            tool_name: tool_name.clone(),
            tool_tier: tool.tier,
            plan_id: None,
            job_id: None,
            approver_id: None,
            approval_request_id: None,
            result: AuditResult::Denied,
            meta: json!({
                "reason": reason,
                "missing_permission": missing_permission,
                "out_of_scope_devices": out_of_scope_devices,
            }),
            error_message: Some(reason.clone()),
        });
        AuthzError::Unauthorized {
            reason,
            missing_permission,
            out_of_scope_devices,
        }
    }
}
