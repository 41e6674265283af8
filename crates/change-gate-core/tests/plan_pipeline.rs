// change-gate-core/tests/plan_pipeline.rs
// ============================================================================
// Module: Plan Pipeline Tests
// Description: Plan creation pipeline, gates, previews, and audit trail.
// ============================================================================
//! ## Overview
//! Covers the plan phase end to end: validation, capability and environment
//! gates, risk classification, previews, and the audit trail left behind.

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
use change_gate_core::CapabilityFlags;
use change_gate_core::DeviceId;
use change_gate_core::Environment;
use change_gate_core::FirewallModifyRule;
use change_gate_core::FirewallRuleModifications;
use change_gate_core::PlanChanges;
use change_gate_core::PlanError;
use change_gate_core::PlanStatus;
use change_gate_core::PreCheckStatus;
use change_gate_core::PreviewDetail;
use change_gate_core::RiskLevel;
use common::Harness;
use common::forward_allow_rule;
use common::plan_request;

// ============================================================================
// SECTION: Happy Path
// ============================================================================

/// Lab add-rule plans at medium risk with a stable preview.
#[test]
fn test_plan_add_rule_lab_happy_path() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01"]);

    let creation = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01"], forward_allow_rule()))
        .expect("plan created");

    assert_eq!(creation.plan.status, PlanStatus::Pending);
    assert_eq!(creation.plan.risk_level, RiskLevel::Medium);
    assert_eq!(creation.plan.device_ids, vec![DeviceId::new("dev-lab-01")]);
    assert!(creation.plan.approval_token.as_deref().is_some_and(|t| t.starts_with("approve-")));
    assert_eq!(
        creation.plan.pre_check_results.get(&DeviceId::new("dev-lab-01")),
        Some(&PreCheckStatus::Passed)
    );

    let preview = &creation.previews[0];
    assert_eq!(preview.operation, "add_firewall_rule");
    match &preview.preview {
        PreviewDetail::AddFirewallRule {
            chain,
            position,
            rule_spec,
            ..
        } => {
            assert_eq!(chain, "forward");
            assert_eq!(position, "auto");
            assert_eq!(
                rule_spec,
                "chain=forward action=accept src-address=192.168.1.0/24 \
                 protocol=tcp dst-port=443 comment=allow https"
            );
        }
        other => panic!("unexpected preview: {other:?}"),
    }

    let events = harness.store.audit_events();
    assert!(events.iter().any(|event| event.action == AuditAction::PlanCreated));
}

// ============================================================================
// SECTION: Environment Gate
// ============================================================================

/// Production devices reject write plans and leave no plan row.
#[test]
fn test_plan_blocked_in_prod() {
    let harness = Harness::new();
    harness.seed_device("dev-prod-01", Environment::Prod);
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-prod-01"]);

    let error = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-prod-01"], forward_allow_rule()))
        .expect_err("prod write must be blocked");

    let message = error.to_string();
    assert!(message.contains("prod environment"), "message: {message}");
    assert!(message.contains("only allowed in"), "message: {message}");
    assert!(matches!(error, PlanError::EnvironmentNotAllowed { .. }));
    assert_eq!(harness.store.plan_count(), 0);
}

// ============================================================================
// SECTION: Capability Gate
// ============================================================================

/// A device without the firewall flag rejects firewall plans.
#[test]
fn test_plan_blocked_without_capability() {
    let harness = Harness::new();
    harness.seed_device_with_caps("dev-lab-01", Environment::Lab, CapabilityFlags::default());
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01"]);

    let error = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01"], forward_allow_rule()))
        .expect_err("capability gate must fire");

    let message = error.to_string();
    assert!(message.contains("firewall write capability"), "message: {message}");
    assert!(matches!(error, PlanError::CapabilityNotAllowed { .. }));
    assert_eq!(harness.store.plan_count(), 0);
}

/// Capability is evaluated per device: one bad device blocks the plan.
#[test]
fn test_plan_blocked_when_any_device_lacks_capability() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    harness.seed_device_with_caps("dev-lab-02", Environment::Lab, CapabilityFlags::default());
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01", "dev-lab-02"]);

    let error = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01", "dev-lab-02"], forward_allow_rule()))
        .expect_err("capability gate must fire");
    match error {
        PlanError::CapabilityNotAllowed {
            device_id, ..
        } => assert_eq!(device_id, DeviceId::new("dev-lab-02")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.store.plan_count(), 0);
}

// ============================================================================
// SECTION: Device Resolution
// ============================================================================

/// Unknown devices surface as `DeviceNotFound` without a plan row.
#[test]
fn test_plan_unknown_device() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01"]);

    let error = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-missing"], forward_allow_rule()))
        .expect_err("unknown device must fail");
    assert!(matches!(error, PlanError::DeviceNotFound(_)));
    assert_eq!(harness.store.plan_count(), 0);
}

// ============================================================================
// SECTION: Modify Semantics
// ============================================================================

/// Modifications are always high risk regardless of chain or environment.
#[test]
fn test_plan_modify_always_high_risk() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let ctx = harness.authorize("plan_modify_firewall_rule", &["dev-lab-01"]);

    let creation = harness
        .plans
        .plan_change(
            &ctx,
            plan_request(
                &["dev-lab-01"],
                PlanChanges::ModifyFirewallRule(FirewallModifyRule {
                    rule_id: "*1".to_string(),
                    chain: "forward".to_string(),
                    modifications: FirewallRuleModifications {
                        action: Some("drop".to_string()),
                        ..FirewallRuleModifications::default()
                    },
                }),
            ),
        )
        .expect("modify plan created");
    assert_eq!(creation.plan.risk_level, RiskLevel::High);
}

/// A modify with no modification fields fails validation.
#[test]
fn test_plan_modify_requires_fields() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let ctx = harness.authorize("plan_modify_firewall_rule", &["dev-lab-01"]);

    let error = harness
        .plans
        .plan_change(
            &ctx,
            plan_request(
                &["dev-lab-01"],
                PlanChanges::ModifyFirewallRule(FirewallModifyRule {
                    rule_id: "*1".to_string(),
                    chain: "forward".to_string(),
                    modifications: FirewallRuleModifications::default(),
                }),
            ),
        )
        .expect_err("empty modification must fail");
    assert!(matches!(error, PlanError::Validation(_)));
    assert!(error.to_string().contains("At least one modification"));
    assert_eq!(harness.store.plan_count(), 0);
}

// ============================================================================
// SECTION: Risk Merge
// ============================================================================

/// Risk is the maximum across target devices.
#[test]
fn test_plan_risk_is_max_over_devices() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    harness.seed_device("dev-stg-01", Environment::Staging);
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01", "dev-stg-01"]);

    // input chain escalates every device to high.
    let mut changes = forward_allow_rule();
    if let PlanChanges::AddFirewallRule(rule) = &mut changes {
        rule.chain = "input".to_string();
    }
    let creation = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01", "dev-stg-01"], changes))
        .expect("plan created");
    assert_eq!(creation.plan.risk_level, RiskLevel::High);
}
