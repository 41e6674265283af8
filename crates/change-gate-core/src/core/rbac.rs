// change-gate-core/src/core/rbac.rs
// ============================================================================
// Module: Change Gate RBAC Model
// Description: Roles, permissions, their association, and user records.
// Purpose: Model the authorization data consulted by the authorization gate.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Authorization is role-based: users hold exactly one role, roles expand to
//! permission rows, and a permission grants an action on a resource type for
//! either a concrete resource id or the `"*"` wildcard. Users may additionally
//! be confined to a device scope; an empty scope means all devices.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DeviceId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::UserSub;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Wildcard resource id matching every resource of a type.
pub const RESOURCE_WILDCARD: &str = "*";

// ============================================================================
// SECTION: Resource Types and Actions
// ============================================================================

/// Resource types permissions can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A managed device.
    Device,
    /// A change plan.
    Plan,
    /// A tool on the invocation surface.
    Tool,
}

impl ResourceType {
    /// Returns the lowercase label for the resource type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Plan => "plan",
            Self::Tool => "tool",
        }
    }
}

/// Actions a permission can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    /// Read resource state.
    Read,
    /// Mutate resource state.
    Write,
    /// Execute a workflow against the resource.
    Execute,
    /// Approve a plan targeting the resource.
    Approve,
}

impl PermissionAction {
    /// Returns the lowercase label for the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Approve => "approve",
        }
    }
}

// ============================================================================
// SECTION: Role and Permission Records
// ============================================================================

/// Named role grouping permissions.
///
/// # Invariants
/// - `name` is unique across roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier.
    pub id: String,
    /// Unique role name.
    pub name: RoleName,
    /// Human-readable description.
    pub description: String,
}

/// Grant of an action on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Permission identifier.
    pub id: String,
    /// Resource type targeted.
    pub resource_type: ResourceType,
    /// Concrete resource id or [`RESOURCE_WILDCARD`].
    pub resource_id: String,
    /// Action granted.
    pub action: PermissionAction,
    /// Optional description.
    pub description: Option<String>,
}

impl Permission {
    /// Returns true when the permission covers the given resource id.
    #[must_use]
    pub fn covers(&self, resource_id: &str) -> bool {
        self.resource_id == RESOURCE_WILDCARD || self.resource_id == resource_id
    }
}

/// Many-to-many association between roles and permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    /// Role identifier.
    pub role_id: String,
    /// Permission identifier.
    pub permission_id: String,
}

// ============================================================================
// SECTION: User Record
// ============================================================================

/// User record keyed by identity-provider subject.
///
/// # Invariants
/// - An empty `device_scopes` grants access to all devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity-provider subject.
    pub sub: UserSub,
    /// Email address, when known.
    pub email: Option<String>,
    /// Display name, when known.
    pub display_name: Option<String>,
    /// Assigned role name.
    pub role_name: RoleName,
    /// Devices the user may target; empty means all.
    pub device_scopes: Vec<DeviceId>,
    /// Whether the account is active.
    pub is_active: bool,
    /// Last successful login.
    pub last_login_at: Option<Timestamp>,
}

impl User {
    /// Returns true when the user's scope covers the given device.
    #[must_use]
    pub fn in_scope(&self, device_id: &DeviceId) -> bool {
        self.device_scopes.is_empty() || self.device_scopes.contains(device_id)
    }
}
