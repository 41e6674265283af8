// change-gate-core/tests/tooling.rs
// ============================================================================
// Module: Tool Envelope Tests
// Description: Wire shape of tool responses and stable error kinds.
// ============================================================================
//! ## Overview
//! Asserts the exact wire keys (`_meta`, `isError`) and the metadata carried
//! by plan and apply responses, plus the stable error-kind labels.

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

use change_gate_core::DeviceId;
use change_gate_core::Environment;
use change_gate_core::PlanError;
use change_gate_core::PlanStatus;
use change_gate_core::TokenError;
use change_gate_core::ToolResponse;
use change_gate_core::tooling::plan_error_kind;
use change_gate_core::tooling::plan_error_response;
use common::Harness;
use common::forward_allow_rule;
use common::plan_request;
use serde_json::Value;

// ============================================================================
// SECTION: Plan Responses
// ============================================================================

/// Plan responses carry the approval metadata under `_meta`.
#[test]
fn test_plan_response_wire_shape() {
    let harness = Harness::new();
    harness.seed_device("dev-lab-01", Environment::Lab);
    let ctx = harness.authorize("plan_add_firewall_rule", &["dev-lab-01"]);
    let creation = harness
        .plans
        .plan_change(&ctx, plan_request(&["dev-lab-01"], forward_allow_rule()))
        .expect("plan created");

    let response = ToolResponse::from_plan(&creation);
    assert!(!response.is_error);
    assert!(response.content[0].text.contains("medium risk"));

    let wire = serde_json::to_value(&response).expect("serializes");
    let meta = wire.get("_meta").expect("meta present");
    assert_eq!(wire.get("isError"), Some(&Value::Bool(false)));
    assert_eq!(
        meta.get("plan_id").and_then(Value::as_str),
        Some(creation.plan.id.as_str())
    );
    assert_eq!(
        meta.get("approval_token").and_then(Value::as_str),
        creation.plan.approval_token.as_deref()
    );
    assert_eq!(meta.get("risk_level").and_then(Value::as_str), Some("medium"));
    assert_eq!(meta.get("device_count").and_then(Value::as_u64), Some(1));
    assert_eq!(meta.get("tool_name").and_then(Value::as_str), Some("plan_add_firewall_rule"));
    let devices = meta.get("devices").and_then(Value::as_array).expect("devices array");
    assert_eq!(
        devices[0].get("device_id").and_then(Value::as_str),
        Some("dev-lab-01")
    );
    assert!(devices[0].get("preview").is_some());
}

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Every plan error maps to its documented stable label.
#[test]
fn test_plan_error_kinds() {
    assert_eq!(
        plan_error_kind(&PlanError::DeviceNotFound(DeviceId::new("dev-x"))),
        "device_not_found"
    );
    assert_eq!(plan_error_kind(&PlanError::Token(TokenError::Missing)), "token_missing");
    assert_eq!(plan_error_kind(&PlanError::Token(TokenError::Mismatch)), "token_mismatch");
    assert_eq!(plan_error_kind(&PlanError::Token(TokenError::Expired)), "token_expired");
    assert_eq!(
        plan_error_kind(&PlanError::InvalidTransition {
            from: PlanStatus::Completed,
            to: PlanStatus::Executing,
        }),
        "invalid_plan_transition"
    );
}

/// Error responses flag `isError` and carry the kind in `_meta`.
#[test]
fn test_error_response_wire_shape() {
    let response = plan_error_response(&PlanError::Token(TokenError::Expired));
    assert!(response.is_error);
    let wire = serde_json::to_value(&response).expect("serializes");
    assert_eq!(wire.get("isError"), Some(&Value::Bool(true)));
    assert_eq!(
        wire.get("_meta").and_then(|meta| meta.get("error_kind")).and_then(Value::as_str),
        Some("token_expired")
    );
}
