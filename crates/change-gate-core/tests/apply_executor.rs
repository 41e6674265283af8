// change-gate-core/tests/apply_executor.rs
// ============================================================================
// Module: Apply Executor Tests
// Description: Snapshot, mutate, health-check, rollback across batches.
// ============================================================================
//! ## Overview
//! Drives the executor against simulated devices: the happy path, health
//! failure with snapshot rollback, expired and mismatched tokens, terminal
//! plan immutability, unreachable devices, cancellation, and progress.

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

use change_gate_core::ApplyError;
use change_gate_core::AuditAction;
use change_gate_core::CancelFlag;
use change_gate_core::DeviceId;
use change_gate_core::DeviceRunStatus;
use change_gate_core::Environment;
use change_gate_core::Plan;
use change_gate_core::PlanError;
use change_gate_core::PlanStatus;
use change_gate_core::TokenError;
use change_gate_core::interfaces::AuditStore;
use change_gate_core::interfaces::JobStore;
use common::Harness;
use common::forward_allow_rule;
use common::plan_request;
use serde_json::Value;

/// Creates a pending plan over the given seeded devices.
fn pending_plan(harness: &Harness, device_ids: &[&str]) -> Plan {
    let ctx = harness.authorize("plan_add_firewall_rule", device_ids);
    harness
        .plans
        .plan_change(&ctx, plan_request(device_ids, forward_allow_rule()))
        .expect("plan created")
        .plan
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

/// Scenario: lab add-rule applies, health passes, everything completes.
#[tokio::test]
async fn test_apply_happy_path() {
    let harness = Harness::new();
    let simulated = harness.seed_device("dev-lab-01", Environment::Lab);
    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    let outcome = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("apply succeeds");

    assert_eq!(outcome.final_status, PlanStatus::Completed);
    assert_eq!(outcome.successful_count, 1);
    assert_eq!(outcome.failed_count, 0);
    assert_eq!(outcome.device_results[0].status, DeviceRunStatus::Completed);

    // One baseline rule plus the new one.
    let objects = simulated.objects();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[1].get("chain").and_then(Value::as_str), Some("forward"));
    assert_eq!(objects[1].get("dst-port").and_then(Value::as_str), Some("443"));

    let reloaded = harness.plans.get_plan(&plan.id).expect("plan exists");
    assert_eq!(reloaded.status, PlanStatus::Completed);
    assert_eq!(
        reloaded.device_statuses.get(&DeviceId::new("dev-lab-01")),
        Some(&DeviceRunStatus::Completed)
    );

    // The snapshot captured the single pre-change rule.
    let snapshots = harness.store.snapshots();
    assert_eq!(snapshots.len(), 1);
    let captured: Value = serde_json::from_slice(&snapshots[0].data).expect("snapshot json");
    assert_eq!(captured.as_array().map(Vec::len), Some(1));

    // Audit trail: started, device succeeded, plan completed, in order.
    let actions: Vec<AuditAction> = harness
        .store
        .events_for_plan(&plan.id)
        .expect("events")
        .into_iter()
        .map(|event| event.action)
        .collect();
    let started = actions
        .iter()
        .position(|a| *a == AuditAction::ApplyStarted)
        .expect("apply.started recorded");
    let succeeded = actions
        .iter()
        .position(|a| *a == AuditAction::ApplyDeviceSucceeded)
        .expect("apply.device.succeeded recorded");
    let completed = actions
        .iter()
        .position(|a| *a == AuditAction::PlanCompleted)
        .expect("plan.completed recorded");
    assert!(started < succeeded && succeeded < completed, "order: {actions:?}");

    // The tracking job finished with full progress.
    let job = harness.store.get_job(&outcome.job_id).expect("job read").expect("job exists");
    assert_eq!(job.progress_percent, 100);
}

// ============================================================================
// SECTION: Rollback Path
// ============================================================================

/// Scenario: health check fails after the post, so the executor deletes the
/// created rule and restores the pre-snapshot rule set exactly.
#[tokio::test]
async fn test_apply_health_failure_rolls_back() {
    let harness = Harness::new();
    let simulated = harness.seed_device("dev-lab-01", Environment::Lab);
    let before = simulated.objects();
    simulated.set_system_resource(Value::Null);

    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    let outcome = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("apply reports outcome");

    assert_eq!(outcome.final_status, PlanStatus::RolledBack);
    let device_result = &outcome.device_results[0];
    assert_eq!(device_result.status, DeviceRunStatus::RolledBack);
    let rollback = device_result.rollback.as_ref().expect("rollback info");
    assert!(rollback.restored);

    // The rule set is byte-for-byte back to the pre-snapshot list.
    assert_eq!(simulated.objects(), before);

    let reloaded = harness.plans.get_plan(&plan.id).expect("plan exists");
    assert_eq!(reloaded.status, PlanStatus::RolledBack);
    let events = harness.store.events_for_plan(&plan.id).expect("events");
    assert!(events.iter().any(|e| e.action == AuditAction::ApplyDeviceRolledBack));
    assert!(events.iter().any(|e| e.action == AuditAction::PlanRolledBack));
}

/// Without `rollback_on_failure` the device is left failed, not reverted.
#[tokio::test]
async fn test_apply_health_failure_without_rollback() {
    let harness = Harness::new();
    let simulated = harness.seed_device("dev-lab-01", Environment::Lab);
    simulated.set_system_resource(Value::Null);

    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01"]);
    let mut request = plan_request(&["dev-lab-01"], forward_allow_rule());
    request.rollback_on_failure = false;
    let plan = harness.plans.plan_change(&ctx, request).expect("plan created").plan;
    let token = plan.approval_token.clone().expect("token minted");

    let apply_ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);
    let outcome = harness
        .executor
        .apply_plan(&apply_ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("apply reports outcome");

    assert_eq!(outcome.final_status, PlanStatus::Failed);
    assert_eq!(outcome.device_results[0].status, DeviceRunStatus::Failed);
    // The posted rule stays on the device.
    assert_eq!(simulated.objects().len(), 2);
}

// ============================================================================
// SECTION: Token Pre-Flight
// ============================================================================

/// Scenario: a correct token presented after expiry is rejected and the plan
/// is left untouched in `pending`.
#[tokio::test]
async fn test_apply_expired_token() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    // 16 minutes later.
    harness.clock.advance_millis(16 * 60 * 1_000);
    let error = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect_err("expired token rejected");
    assert!(matches!(error, ApplyError::Plan(PlanError::Token(TokenError::Expired))));

    let reloaded = harness.plans.get_plan(&plan.id).expect("plan exists");
    assert_eq!(reloaded.status, PlanStatus::Pending);
}

/// A wrong token is rejected before any transition.
#[tokio::test]
async fn test_apply_token_mismatch() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    let error = harness
        .executor
        .apply_plan(&ctx, &plan.id, "approve-forged", &CancelFlag::new())
        .await
        .expect_err("mismatched token rejected");
    assert!(matches!(error, ApplyError::Plan(PlanError::Token(TokenError::Mismatch))));
    assert_eq!(harness.plans.get_plan(&plan.id).expect("plan").status, PlanStatus::Pending);
}

/// Applying an already-completed plan is an invalid transition and does not
/// touch the device.
#[tokio::test]
async fn test_apply_completed_plan_rejected() {
    let harness = Harness::new();
    let simulated = harness.seed_device("dev-lab-01", Environment::Lab);
    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("first apply succeeds");
    let objects_after_first = simulated.objects();

    let error = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect_err("second apply rejected");
    assert!(matches!(
        error,
        ApplyError::Plan(PlanError::InvalidTransition {
            from: PlanStatus::Completed,
            ..
        })
    ));
    assert_eq!(simulated.objects(), objects_after_first);
}

// ============================================================================
// SECTION: Transport Failures
// ============================================================================

/// An unreachable device fails after connect retries; nothing was mutated, so
/// there is nothing to roll back.
#[tokio::test]
async fn test_apply_unreachable_device() {
    let harness = Harness::new();
    let simulated = harness.seed_device("dev-lab-01", Environment::Lab);
    simulated.set_unreachable();

    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    let outcome = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("apply reports outcome");
    assert_eq!(outcome.final_status, PlanStatus::Failed);
    let device_result = &outcome.device_results[0];
    assert_eq!(device_result.status, DeviceRunStatus::Failed);
    assert!(device_result.error.as_deref().is_some_and(|e| e.contains("connect")));
    assert!(device_result.rollback.is_none());
    assert_eq!(simulated.objects().len(), 1);
}

/// A mutation that keeps failing with a 500 is retried, then rolled back to
/// a failure without a created object.
#[tokio::test]
async fn test_apply_mutation_failure() {
    let harness = Harness::new();
    let simulated = harness.seed_device("dev-lab-01", Environment::Lab);
    simulated.set_fail_mutations();

    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    let outcome = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("apply reports outcome");
    assert_eq!(outcome.final_status, PlanStatus::Failed);
    assert_eq!(outcome.device_results[0].status, DeviceRunStatus::Failed);
    assert_eq!(simulated.objects().len(), 1);
}

// ============================================================================
// SECTION: Batching, Progress, Cancellation
// ============================================================================

/// Devices are processed in batches with the configured pause; progress
/// reaches 100 and every device completes.
#[tokio::test(start_paused = true)]
async fn test_apply_batches_and_progress() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    harness.seed_device("dev-lab-02", Environment::Lab);
    harness.seed_device("dev-lab-03", Environment::Lab);

    let ctx = harness.authorize(
        "plan_add_firewall_rule",
        &["dev-lab-01", "dev-lab-02", "dev-lab-03"],
    );
    let mut request = plan_request(
        &["dev-lab-01", "dev-lab-02", "dev-lab-03"],
        forward_allow_rule(),
    );
    request.batch_size = 2;
    request.pause_seconds_between_batches = 30;
    let plan = harness.plans.plan_change(&ctx, request).expect("plan created").plan;
    let token = plan.approval_token.clone().expect("token minted");

    let apply_ctx = harness.authorize(
        "apply_firewall_plan",
        &["dev-lab-01", "dev-lab-02", "dev-lab-03"],
    );
    let outcome = harness
        .executor
        .apply_plan(&apply_ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("apply succeeds");

    assert_eq!(outcome.final_status, PlanStatus::Completed);
    assert_eq!(outcome.successful_count, 3);
    let job = harness.store.get_job(&outcome.job_id).expect("job read").expect("job exists");
    assert_eq!(job.progress_percent, 100);
}

/// A cancellation requested before the first batch drains to `cancelled`
/// without touching any device.
#[tokio::test]
async fn test_apply_cancelled_at_batch_boundary() {
    let harness = Harness::new();
    let simulated = harness.seed_device("dev-lab-01", Environment::Lab);
    let plan = pending_plan(&harness, &["dev-lab-01"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01"]);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let outcome = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &cancel)
        .await
        .expect("apply reports outcome");

    assert_eq!(outcome.final_status, PlanStatus::Cancelled);
    assert!(outcome.device_results.is_empty());
    assert_eq!(simulated.objects().len(), 1);
    let reloaded = harness.plans.get_plan(&plan.id).expect("plan exists");
    assert_eq!(reloaded.status, PlanStatus::Cancelled);
    assert_eq!(
        reloaded.device_statuses.get(&DeviceId::new("dev-lab-01")),
        Some(&DeviceRunStatus::Pending)
    );
}

/// One failing device among healthy peers rolls the plan back while the
/// healthy device keeps its change.
#[tokio::test]
async fn test_apply_mixed_outcomes() {
    let harness = Harness::new();
    let healthy = harness.seed_device("dev-lab-01", Environment::Lab);
    let failing = harness.seed_device("dev-lab-02", Environment::Lab);
    failing.set_system_resource(Value::Null);

    let plan = pending_plan(&harness, &["dev-lab-01", "dev-lab-02"]);
    let token = plan.approval_token.clone().expect("token minted");
    let ctx = harness.authorize("apply_firewall_plan", &["dev-lab-01", "dev-lab-02"]);

    let outcome = harness
        .executor
        .apply_plan(&ctx, &plan.id, &token, &CancelFlag::new())
        .await
        .expect("apply reports outcome");

    assert_eq!(outcome.final_status, PlanStatus::RolledBack);
    assert_eq!(outcome.successful_count, 1);
    assert_eq!(outcome.failed_count, 1);
    assert_eq!(healthy.objects().len(), 2);
    assert_eq!(failing.objects().len(), 1);

    let reloaded = harness.plans.get_plan(&plan.id).expect("plan exists");
    assert_eq!(
        reloaded.device_statuses.get(&DeviceId::new("dev-lab-01")),
        Some(&DeviceRunStatus::Completed)
    );
    assert_eq!(
        reloaded.device_statuses.get(&DeviceId::new("dev-lab-02")),
        Some(&DeviceRunStatus::RolledBack)
    );
}
