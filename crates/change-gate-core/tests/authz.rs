// change-gate-core/tests/authz.rs
// ============================================================================
// Module: Authorization Gate Tests
// Description: RBAC resolution, device scopes, and denial auditing.
// ============================================================================
//! ## Overview
//! Covers the fail-closed authorization path: inactive users, missing
//! permissions, wildcard grants, device scopes, and the denied audit trail.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use change_gate_core::AuditAction;
use change_gate_core::AuditResult;
use change_gate_core::AuthzError;
use change_gate_core::DeviceId;
use change_gate_core::Permission;
use change_gate_core::PermissionAction;
use change_gate_core::ResourceType;
use change_gate_core::RoleName;
use change_gate_core::ToolName;
use change_gate_core::ToolTier;
use change_gate_core::User;
use change_gate_core::UserSub;
use change_gate_core::core::rbac::Role;
use change_gate_core::interfaces::UserStore;
use change_gate_core::tool_spec;
use common::Harness;

/// Seeds a user with the given role and device scope.
fn seed_user(harness: &Harness, sub: &str, role: &str, scopes: &[&str], active: bool) {
    harness
        .store
        .upsert_user(&User {
            sub: UserSub::new(sub),
            email: None,
            display_name: None,
            role_name: RoleName::new(role),
            device_scopes: scopes.iter().map(|id| DeviceId::new(*id)).collect(),
            is_active: active,
            last_login_at: None,
        })
        .expect("seed user");
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Every plan/apply tool resolves to a professional-tier registry entry.
#[test]
fn test_tool_registry_lookup() {
    let spec = tool_spec(&ToolName::new("plan_add_firewall_rule")).expect("registered");
    assert_eq!(spec.resource_type, ResourceType::Device);
    assert_eq!(spec.action, PermissionAction::Write);
    assert_eq!(spec.tier, ToolTier::Professional);

    let apply = tool_spec(&ToolName::new("apply_dhcp_plan")).expect("registered");
    assert_eq!(apply.action, PermissionAction::Execute);

    assert!(tool_spec(&ToolName::new("reboot_device")).is_none());
}

// ============================================================================
// SECTION: Denials
// ============================================================================

/// Inactive users are denied outright.
#[test]
fn test_inactive_user_denied() {
    let harness = Harness::new();
    seed_user(&harness, "ghost", "admin", &[], false);

    let error = harness
        .gate
        .authorize(
            &UserSub::new("ghost"),
            &ToolName::new("plan_add_firewall_rule"),
            &[DeviceId::new("dev-lab-01")],
        )
        .expect_err("inactive user denied");
    assert!(matches!(error, AuthzError::Unauthorized { .. }));
    assert!(error.to_string().contains("inactive"));
}

/// Unknown users are denied without leaking store state.
#[test]
fn test_unknown_user_denied() {
    let harness = Harness::new();
    let error = harness
        .gate
        .authorize(
            &UserSub::new("nobody"),
            &ToolName::new("plan_add_firewall_rule"),
            &[DeviceId::new("dev-lab-01")],
        )
        .expect_err("unknown user denied");
    assert!(matches!(error, AuthzError::Unauthorized { .. }));
}

/// A role without the required permission reports what was missing.
#[test]
fn test_missing_permission_denied() {
    let harness = Harness::new();
    harness
        .store
        .seed_role(
            Role {
                id: "role-viewer".to_string(),
                name: RoleName::new("read_only"),
                description: "Read-only".to_string(),
            },
            vec![Permission {
                id: "perm-device-read".to_string(),
                resource_type: ResourceType::Device,
                resource_id: "*".to_string(),
                action: PermissionAction::Read,
                description: None,
            }],
        )
        .expect("seed viewer role");
    seed_user(&harness, "viewer", "read_only", &[], true);

    let error = harness
        .gate
        .authorize(
            &UserSub::new("viewer"),
            &ToolName::new("plan_add_firewall_rule"),
            &[DeviceId::new("dev-lab-01")],
        )
        .expect_err("viewer cannot plan writes");
    match error {
        AuthzError::Unauthorized {
            missing_permission, ..
        } => {
            let missing = missing_permission.expect("missing permission reported");
            assert!(missing.contains("device:write"), "missing: {missing}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Device-scoped users cannot target devices outside the scope, and the
/// offending devices are listed.
#[test]
fn test_out_of_scope_devices_listed() {
    let harness = Harness::new();
    seed_user(&harness, "scoped", "admin", &["dev-lab-01"], true);

    let error = harness
        .gate
        .authorize(
            &UserSub::new("scoped"),
            &ToolName::new("plan_add_firewall_rule"),
            &[DeviceId::new("dev-lab-01"), DeviceId::new("dev-lab-02")],
        )
        .expect_err("out-of-scope denied");
    match error {
        AuthzError::Unauthorized {
            out_of_scope_devices, ..
        } => assert_eq!(out_of_scope_devices, vec![DeviceId::new("dev-lab-02")]),
        other => panic!("unexpected error: {other}"),
    }
}

/// An empty scope means every device is permitted.
#[test]
fn test_empty_scope_means_all_devices() {
    let harness = Harness::new();
    let ctx = harness
        .gate
        .authorize(
            &UserSub::new("operator"),
            &ToolName::new("plan_add_firewall_rule"),
            &[DeviceId::new("dev-a"), DeviceId::new("dev-b"), DeviceId::new("dev-c")],
        )
        .expect("wildcard admin authorized");
    assert_eq!(ctx.role.name, RoleName::new("admin"));
}

/// Concrete permission rows work without the wildcard.
#[test]
fn test_concrete_permission_row() {
    let harness = Harness::new();
    harness
        .store
        .seed_role(
            Role {
                id: "role-single".to_string(),
                name: RoleName::new("single_device"),
                description: "One device only".to_string(),
            },
            vec![Permission {
                id: "perm-one".to_string(),
                resource_type: ResourceType::Device,
                resource_id: "dev-lab-01".to_string(),
                action: PermissionAction::Write,
                description: None,
            }],
        )
        .expect("seed role");
    seed_user(&harness, "narrow", "single_device", &[], true);

    harness
        .gate
        .authorize(
            &UserSub::new("narrow"),
            &ToolName::new("plan_add_firewall_rule"),
            &[DeviceId::new("dev-lab-01")],
        )
        .expect("covered device authorized");
    harness
        .gate
        .authorize(
            &UserSub::new("narrow"),
            &ToolName::new("plan_add_firewall_rule"),
            &[DeviceId::new("dev-lab-02")],
        )
        .expect_err("uncovered device denied");
}

// ============================================================================
// SECTION: Denial Audit
// ============================================================================

/// Every denial leaves a `plan.denied` audit event before surfacing.
#[test]
fn test_denial_is_audited() {
    let harness = Harness::new();
    seed_user(&harness, "ghost", "admin", &[], false);

    let _ = harness.gate.authorize(
        &UserSub::new("ghost"),
        &ToolName::new("plan_add_firewall_rule"),
        &[DeviceId::new("dev-lab-01")],
    );

    let events = harness.store.audit_events();
    let denied = events
        .iter()
        .find(|event| event.action == AuditAction::PlanDenied)
        .expect("denied event recorded");
    assert_eq!(denied.result, AuditResult::Denied);
    assert_eq!(denied.user_sub, UserSub::new("ghost"));
}
