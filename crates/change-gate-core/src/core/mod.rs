// change-gate-core/src/core/mod.rs
// ============================================================================
// Module: Change Gate Core Types
// Description: Canonical data model for devices, plans, jobs, and audit.
// Purpose: Provide stable, serializable types for the change-control core.
// Dependencies: serde, serde_json, zeroize
// ============================================================================

//! ## Overview
//! Core types define the persisted entities of the change-control workflow:
//! devices and their capability flags, encrypted credentials, approval-gated
//! plans, apply jobs, rollback snapshots, audit events, and RBAC records.
//! These types are the canonical source of truth for any derived surface.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod changes;
pub mod credential;
pub mod device;
pub mod health;
pub mod identifiers;
pub mod job;
pub mod plan;
pub mod rbac;
pub mod snapshot;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditAction;
pub use audit::AuditEvent;
pub use audit::AuditEventParams;
pub use audit::AuditResult;
pub use audit::ToolTier;
pub use changes::BridgeVlanAdd;
pub use changes::BridgeVlanRemove;
pub use changes::DevicePreview;
pub use changes::DhcpLeaseAdd;
pub use changes::DhcpLeaseRemove;
pub use changes::FirewallAddRule;
pub use changes::FirewallModifyRule;
pub use changes::FirewallRemoveRule;
pub use changes::FirewallRuleModifications;
pub use changes::PlanChanges;
pub use changes::PreCheckStatus;
pub use changes::PreviewDetail;
pub use changes::RouteAdd;
pub use changes::RouteRemove;
pub use changes::WirelessInterfaceUpdate;
pub use changes::WirelessSettings;
pub use credential::Credential;
pub use credential::CredentialKind;
pub use credential::SecretMaterial;
pub use device::CapabilityFlags;
pub use device::Device;
pub use device::DeviceFilter;
pub use device::DeviceStatus;
pub use device::Environment;
pub use device::EnvironmentParseError;
pub use device::ToolFamily;
pub use health::HealthCheck;
pub use health::HealthStatus;
pub use identifiers::AuditEventId;
pub use identifiers::CredentialId;
pub use identifiers::DeviceId;
pub use identifiers::JobId;
pub use identifiers::PlanId;
pub use identifiers::RoleName;
pub use identifiers::SnapshotId;
pub use identifiers::ToolName;
pub use identifiers::UserSub;
pub use job::Job;
pub use job::JobStatus;
pub use job::JobType;
pub use plan::DeviceRunStatus;
pub use plan::Plan;
pub use plan::PlanStatus;
pub use plan::RiskLevel;
pub use rbac::Permission;
pub use rbac::PermissionAction;
pub use rbac::RESOURCE_WILDCARD;
pub use rbac::ResourceType;
pub use rbac::Role;
pub use rbac::RolePermission;
pub use rbac::User;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotKind;
pub use time::Timestamp;
