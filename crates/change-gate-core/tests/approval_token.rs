// change-gate-core/tests/approval_token.rs
// ============================================================================
// Module: Approval Token and State Machine Tests
// Description: Token boundaries, guarded transitions, optimistic checks.
// ============================================================================
//! ## Overview
//! Covers token expiry boundaries to the millisecond, the distinct token
//! error kinds, the plan state machine, and per-plan transition serialization.

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

use change_gate_core::ActorInfo;
use change_gate_core::Environment;
use change_gate_core::Plan;
use change_gate_core::PlanError;
use change_gate_core::PlanStatus;
use change_gate_core::StoreError;
use change_gate_core::TokenError;
use change_gate_core::ToolTier;
use change_gate_core::interfaces::AuditStore;
use change_gate_core::interfaces::PlanStore;
use change_gate_core::plan::token::mint_approval_token;
use change_gate_core::plan::token::tokens_match;
use common::Harness;
use common::forward_allow_rule;
use common::plan_request;

/// Creates a pending plan on a seeded lab device.
fn pending_plan(harness: &Harness) -> Plan {
    harness.seed_device("dev-lab-01", Environment::Lab);
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01"]);
    harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01"], forward_allow_rule()))
        .expect("plan created")
        .plan
}

// ============================================================================
// SECTION: Token Validation
// ============================================================================

/// The stored token validates until the exact expiry instant.
#[test]
fn test_token_accepted_until_expiry_boundary() {
    let harness = Harness::new();
    let plan = pending_plan(&harness);
    let token = plan.approval_token.clone().expect("token minted");

    // Default TTL is 15 minutes; one millisecond before expiry still passes.
    harness.clock.advance_millis(900_000 - 1);
    harness.plans.validate_approval_token(&plan, &token).expect("token still valid");

    // At the expiry instant the token is still accepted (expiry is strict).
    harness.clock.advance_millis(1);
    harness.plans.validate_approval_token(&plan, &token).expect("boundary instant accepted");

    // One millisecond past expiry it is rejected.
    harness.clock.advance_millis(1);
    let error = harness
        .plans
        .validate_approval_token(&plan, &token)
        .expect_err("expired token rejected");
    assert_eq!(error, TokenError::Expired);
}

/// A wrong token is a mismatch, not an expiry.
#[test]
fn test_token_mismatch() {
    let harness = Harness::new();
    let plan = pending_plan(&harness);
    let error = harness
        .plans
        .validate_approval_token(&plan, "approve-wrong")
        .expect_err("mismatch rejected");
    assert_eq!(error, TokenError::Mismatch);
}

/// A plan without a token reports `Missing`.
#[test]
fn test_token_missing() {
    let harness = Harness::new();
    let mut plan = pending_plan(&harness);
    plan.approval_token = None;
    let error = harness
        .plans
        .validate_approval_token(&plan, "approve-any")
        .expect_err("missing token rejected");
    assert_eq!(error, TokenError::Missing);
}

/// Terminal plans are not applicable for token validation.
#[test]
fn test_token_plan_not_applicable() {
    let harness = Harness::new();
    let mut plan = pending_plan(&harness);
    let token = plan.approval_token.clone().expect("token minted");
    plan.status = PlanStatus::Completed;
    let error = harness
        .plans
        .validate_approval_token(&plan, &token)
        .expect_err("terminal plan rejected");
    assert_eq!(
        error,
        TokenError::PlanNotApplicable {
            status: PlanStatus::Completed
        }
    );
}

/// Comparison is symmetric and rejects prefixes and extensions.
#[test]
fn test_token_comparison_shape() {
    let token = mint_approval_token();
    assert!(tokens_match(&token, &token));
    assert!(!tokens_match(&token[..token.len() - 1], &token));
    assert!(!tokens_match(&format!("{token}0"), &token));
}

/// Two plans never share an approval token.
#[test]
fn test_token_unique_across_plans() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01"]);
    let first = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01"], forward_allow_rule()))
        .expect("first plan");
    let second = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01"], forward_allow_rule()))
        .expect("second plan");
    assert_ne!(first.plan.approval_token, second.plan.approval_token);

    // The store enforces the constraint directly as well.
    let mut clone = second.plan.clone();
    clone.id = change_gate_core::PlanId::new("plan-duplicate-token");
    let error = harness.store.insert_plan(&clone).expect_err("token reuse rejected");
    assert!(matches!(error, StoreError::Conflict(_)));
}

// ============================================================================
// SECTION: State Machine
// ============================================================================

/// The transition matrix admits exactly the documented edges.
#[test]
fn test_transition_matrix() {
    use PlanStatus::{
        Approved, Cancelled, Completed, Executing, Expired, Failed, Pending, RolledBack,
    };
    assert!(Pending.can_transition_to(Approved));
    assert!(Pending.can_transition_to(Executing));
    assert!(Pending.can_transition_to(Expired));
    assert!(Pending.can_transition_to(Cancelled));
    assert!(!Pending.can_transition_to(Completed));

    assert!(Approved.can_transition_to(Executing));
    assert!(Approved.can_transition_to(Expired));
    assert!(!Approved.can_transition_to(Approved));

    assert!(Executing.can_transition_to(Completed));
    assert!(Executing.can_transition_to(Failed));
    assert!(Executing.can_transition_to(RolledBack));
    assert!(Executing.can_transition_to(Cancelled));
    assert!(!Executing.can_transition_to(Expired));

    for terminal in [Completed, Failed, RolledBack, Expired, Cancelled] {
        assert!(terminal.is_terminal());
        for next in [Pending, Approved, Executing, Completed, Failed, RolledBack] {
            assert!(!terminal.can_transition_to(next));
        }
    }
}

/// Approving records the approver and timestamp.
#[test]
fn test_approve_records_approver() {
    let harness = Harness::new();
    let plan = pending_plan(&harness);
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    let approved = harness
        .plans
        .update_plan_status(
            &plan.id,
            PlanStatus::Approved,
            &ActorInfo::from(&ctx),
            ToolTier::Professional,
        )
        .expect("approved");
    assert_eq!(approved.status, PlanStatus::Approved);
    assert_eq!(approved.approved_by.as_ref().map(ToString::to_string), Some("operator".to_string()));
    assert!(approved.approved_at.is_some());
}

/// Illegal transitions raise `InvalidTransition` and change nothing.
#[test]
fn test_invalid_transition_rejected() {
    let harness = Harness::new();
    let plan = pending_plan(&harness);
    let error = harness
        .plans
        .update_plan_status(
            &plan.id,
            PlanStatus::Completed,
            &ActorInfo::system(),
            ToolTier::Professional,
        )
        .expect_err("pending cannot complete directly");
    assert!(matches!(error, PlanError::InvalidTransition { .. }));
    let reloaded = harness.plans.get_plan(&plan.id).expect("plan exists");
    assert_eq!(reloaded.status, PlanStatus::Pending);
}

/// Concurrent transitions serialize: the stale writer observes a conflict.
#[test]
fn test_optimistic_pre_image_check() {
    let harness = Harness::new();
    let plan = pending_plan(&harness);

    // A competing writer moves the plan first.
    harness
        .plans
        .update_plan_status(
            &plan.id,
            PlanStatus::Cancelled,
            &ActorInfo::system(),
            ToolTier::Professional,
        )
        .expect("cancel wins");

    // The stale writer re-checks the pre-image in the store and loses.
    let error = harness
        .store
        .transition_plan_status(
            &plan.id,
            PlanStatus::Pending,
            PlanStatus::Approved,
            None,
            harness.plans.get_plan(&plan.id).expect("plan").updated_at,
        )
        .expect_err("stale transition conflicts");
    assert!(matches!(error, StoreError::Conflict(_)));
}

/// Expiry is a guarded transition with its own audit action.
#[test]
fn test_expire_plan() {
    let harness = Harness::new();
    let plan = pending_plan(&harness);
    let expired = harness.plans.expire_plan(&plan.id).expect("expired");
    assert_eq!(expired.status, PlanStatus::Expired);
    let events = harness.store.events_for_plan(&plan.id).expect("events");
    assert!(events.iter().any(|event| {
        event.action == change_gate_core::AuditAction::PlanExpired
    }));
}
