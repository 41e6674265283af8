// change-gate-core/src/lib.rs
// ============================================================================
// Module: Change Gate Core Library
// Description: Public API surface for the change-control core.
// Purpose: Expose core types, interfaces, services, and runtime helpers.
// Dependencies: crate::{apply, authz, core, families, interfaces, plan, runtime, tooling}
// ============================================================================

//! ## Overview
//! Change Gate core implements the plan/apply change-control workflow for
//! managed network devices: capability-gated planning with risk assessment
//! and previews, time-bounded approval tokens, and batch apply with
//! snapshot-based rollback. It is backend-agnostic and integrates through
//! explicit interfaces rather than embedding into a particular server.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod apply;
pub mod authz;
pub mod core;
pub mod families;
pub mod interfaces;
pub mod plan;
pub mod runtime;
pub mod tooling;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use apply::ApplyError;
pub use apply::ApplyExecutor;
pub use apply::ApplyExecutorParts;
pub use apply::ApplyOutcome;
pub use apply::ApplySettings;
pub use apply::CancelFlag;
pub use apply::DeviceApplyResult;
pub use apply::RollbackInfo;
pub use authz::AuthorizationGate;
pub use authz::AuthzContext;
pub use authz::AuthzError;
pub use authz::ToolSpec;
pub use authz::tool_spec;
pub use crate::core::*;
pub use families::EngineError;
pub use families::FamilyEngine;
pub use families::FieldError;
pub use families::Mutation;
pub use families::MutationOutcome;
pub use families::ValidationError;
pub use families::engine_for;
pub use interfaces::AuditStore;
pub use interfaces::CipherError;
pub use interfaces::Clock;
pub use interfaces::CredentialStore;
pub use interfaces::DeviceStore;
pub use interfaces::DeviceTransport;
pub use interfaces::HealthCheckStore;
pub use interfaces::JobStore;
pub use interfaces::PlanStore;
pub use interfaces::RbacStore;
pub use interfaces::SecretCipher;
pub use interfaces::SnapshotStore;
pub use interfaces::StoreError;
pub use interfaces::SystemClock;
pub use interfaces::TransportError;
pub use interfaces::TransportFactory;
pub use interfaces::UserStore;
pub use plan::ActorInfo;
pub use plan::PlanCreation;
pub use plan::PlanError;
pub use plan::PlanRequest;
pub use plan::PlanService;
pub use plan::PlanSettings;
pub use plan::TokenError;
pub use runtime::AuditRecorder;
pub use runtime::ManualClock;
pub use runtime::MemoryStore;
pub use runtime::NoopFallbackSink;
pub use runtime::PassthroughCipher;
pub use runtime::SimulatedDevice;
pub use runtime::SimulatedTransportFactory;
pub use runtime::StderrFallbackSink;
pub use tooling::ToolContent;
pub use tooling::ToolResponse;
