// change-gate-core/src/apply/mod.rs
// ============================================================================
// Module: Change Gate Apply Executor
// Description: Snapshot, mutate, health-check, rollback across device batches.
// Purpose: Execute approved plans atomically per device with bounded retries.
// Dependencies: crate::{authz, core, families, interfaces, plan, runtime},
// serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! The executor drives the apply phase. After token and status pre-flight it
//! fans devices out in batches of `batch_size` concurrent workers with a timed
//! pause between batches. Each worker runs the atomic per-device protocol:
//! resolve transport, snapshot the affected collection, mutate, health-check,
//! and roll back from the snapshot on failure when the plan allows it.
//!
//! All plan, job, and audit writes happen on the orchestrating task, so audit
//! events for a plan are produced by a single writer and totally ordered.
//! Workers only touch the device and the snapshot/health stores.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::authz::AuthzContext;
use crate::core::AuditAction;
use crate::core::AuditEventParams;
use crate::core::AuditResult;
use crate::core::CredentialKind;
use crate::core::DeviceId;
use crate::core::DeviceRunStatus;
use crate::core::Environment;
use crate::core::HealthCheck;
use crate::core::HealthStatus;
use crate::core::Job;
use crate::core::JobId;
use crate::core::JobStatus;
use crate::core::JobType;
use crate::core::Plan;
use crate::core::PlanChanges;
use crate::core::PlanId;
use crate::core::PlanStatus;
use crate::core::Snapshot;
use crate::core::SnapshotId;
use crate::families::FamilyEngine;
use crate::families::Mutation;
use crate::families::MutationOutcome;
use crate::families::engine_for;
use crate::families::object_id;
use crate::interfaces::Clock;
use crate::interfaces::CredentialStore;
use crate::interfaces::DeviceStore;
use crate::interfaces::DeviceTransport;
use crate::interfaces::HealthCheckStore;
use crate::interfaces::JobStore;
use crate::interfaces::PlanStore;
use crate::interfaces::SecretCipher;
use crate::interfaces::SnapshotStore;
use crate::interfaces::StoreError;
use crate::interfaces::TransportError;
use crate::interfaces::TransportFactory;
use crate::plan::ActorInfo;
use crate::plan::PlanError;
use crate::plan::PlanService;
use crate::runtime::mint::random_id;
use crate::runtime::recorder::AuditRecorder;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Apply-phase policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplySettings {
    /// Total per-device deadline in seconds.
    pub device_timeout_seconds: u64,
    /// Per-RPC read timeout in seconds.
    pub transport_timeout_seconds: u64,
    /// Batch size used when the plan requests 0.
    pub default_batch_size: u32,
    /// Inter-batch pause used when the plan requests 0.
    pub default_pause_seconds: u64,
    /// Maximum attempts for a transport call within a device.
    pub max_attempts: u32,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            device_timeout_seconds: 300,
            transport_timeout_seconds: 30,
            default_batch_size: 5,
            default_pause_seconds: 60,
            max_attempts: 3,
        }
    }
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cancellation flag observed at batch boundaries.
///
/// In-flight per-device operations always run to their next terminal step;
/// cancellation only prevents new batches from starting.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true when cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Apply executor errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Pre-flight or transition failure from the plan service.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// Plan or job persistence failed mid-apply.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Rollback detail attached to a device result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackInfo {
    /// Snapshot the rollback replayed from.
    pub snapshot_id: SnapshotId,
    /// Whether the snapshot state was restored.
    pub restored: bool,
}

/// Terminal outcome for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceApplyResult {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Terminal device status.
    pub status: DeviceRunStatus,
    /// Failure detail, when not completed.
    pub error: Option<String>,
    /// Rollback detail, when a rollback was attempted.
    pub rollback: Option<RollbackInfo>,
}

/// Outcome of a full plan apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    /// Plan that was applied.
    pub plan_id: PlanId,
    /// Job that tracked the apply.
    pub job_id: JobId,
    /// Terminal plan status.
    pub final_status: PlanStatus,
    /// Devices that completed successfully.
    pub successful_count: usize,
    /// Devices that did not complete.
    pub failed_count: usize,
    /// Per-device results in processing order.
    pub device_results: Vec<DeviceApplyResult>,
    /// Audit appends that failed and were routed to the fallback sink.
    pub audit_write_failures: u64,
}

/// Worker-side result before orchestrator bookkeeping.
#[derive(Debug, Clone)]
struct DeviceWorkResult {
    /// Device identifier.
    device_id: DeviceId,
    /// Device environment, when the device resolved.
    environment: Option<Environment>,
    /// Terminal device status.
    status: DeviceRunStatus,
    /// Failure detail, when not completed.
    error: Option<String>,
    /// Rollback detail, when a rollback was attempted.
    rollback: Option<RollbackInfo>,
}

impl DeviceWorkResult {
    /// Builds a failed result.
    fn failed(
        device_id: DeviceId,
        environment: Option<Environment>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            device_id,
            environment,
            status: DeviceRunStatus::Failed,
            error: Some(error.into()),
            rollback: None,
        }
    }
}

// ============================================================================
// SECTION: Worker Context
// ============================================================================

/// Shared dependencies cloned into each per-device worker.
struct WorkerCtx {
    /// Device registry reads.
    devices: Arc<dyn DeviceStore + Send + Sync>,
    /// Credential retrieval.
    credentials: Arc<dyn CredentialStore + Send + Sync>,
    /// Snapshot persistence.
    snapshots: Arc<dyn SnapshotStore + Send + Sync>,
    /// Health sample persistence.
    health: Arc<dyn HealthCheckStore + Send + Sync>,
    /// Transport resolution.
    transports: Arc<dyn TransportFactory>,
    /// Credential decryption.
    cipher: Arc<dyn SecretCipher + Send + Sync>,
    /// Time source.
    clock: Arc<dyn Clock + Send + Sync>,
    /// Apply-phase settings.
    settings: ApplySettings,
    /// Change payload being applied.
    changes: PlanChanges,
    /// Whether failed devices roll back from their snapshots.
    rollback_on_failure: bool,
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Dependencies assembled into an [`ApplyExecutor`].
pub struct ApplyExecutorParts {
    /// Device registry reads.
    pub devices: Arc<dyn DeviceStore + Send + Sync>,
    /// Credential retrieval.
    pub credentials: Arc<dyn CredentialStore + Send + Sync>,
    /// Plan persistence.
    pub plans: Arc<dyn PlanStore + Send + Sync>,
    /// Job persistence.
    pub jobs: Arc<dyn JobStore + Send + Sync>,
    /// Snapshot persistence.
    pub snapshots: Arc<dyn SnapshotStore + Send + Sync>,
    /// Health sample persistence.
    pub health: Arc<dyn HealthCheckStore + Send + Sync>,
    /// Transport resolution.
    pub transports: Arc<dyn TransportFactory>,
    /// Credential decryption.
    pub cipher: Arc<dyn SecretCipher + Send + Sync>,
    /// Time source.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// Audit recorder.
    pub recorder: Arc<AuditRecorder>,
    /// Plan service for pre-flight and transitions.
    pub plan_service: Arc<PlanService>,
    /// Apply-phase settings.
    pub settings: ApplySettings,
}

/// Apply-phase executor.
pub struct ApplyExecutor {
    /// Assembled dependencies.
    parts: ApplyExecutorParts,
}

impl ApplyExecutor {
    /// Creates an executor from its dependencies.
    #[must_use]
    pub const fn new(parts: ApplyExecutorParts) -> Self {
        Self {
            parts,
        }
    }

    /// Applies a plan bearing a presented approval token.
    ///
    /// Pre-flight validates the transition and token, moves the plan to
    /// `executing`, then processes devices in batches. The plan's terminal
    /// status is the merge of per-device outcomes; cancellation is honored
    /// at batch boundaries only.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Plan`] for pre-flight failures (unknown plan,
    /// illegal transition, token errors) and [`ApplyError::Store`] when plan
    /// persistence fails mid-apply. Per-device failures are reported in the
    /// outcome, not as errors.
    pub async fn apply_plan(
        &self,
        ctx: &AuthzContext,
        plan_id: &PlanId,
        presented_token: &str,
        cancel: &CancelFlag,
    ) -> Result<ApplyOutcome, ApplyError> {
        let parts = &self.parts;
        let plan = parts.plan_service.get_plan(plan_id)?;
        if !plan.status.can_transition_to(PlanStatus::Executing) {
            return Err(PlanError::InvalidTransition {
                from: plan.status,
                to: PlanStatus::Executing,
            }
            .into());
        }
        parts
            .plan_service
            .validate_approval_token(&plan, presented_token)
            .map_err(PlanError::Token)?;

        let actor = ActorInfo::from(ctx);
        let mut plan =
            parts.plan_service.update_plan_status(plan_id, PlanStatus::Executing, &actor, ctx.tool.tier)?;

        let mut job = self.new_job(&plan);
        parts.jobs.insert_job(&job)?;

        let worker_ctx = Arc::new(WorkerCtx {
            devices: Arc::clone(&parts.devices),
            credentials: Arc::clone(&parts.credentials),
            snapshots: Arc::clone(&parts.snapshots),
            health: Arc::clone(&parts.health),
            transports: Arc::clone(&parts.transports),
            cipher: Arc::clone(&parts.cipher),
            clock: Arc::clone(&parts.clock),
            settings: parts.settings,
            changes: plan.changes.clone(),
            rollback_on_failure: plan.rollback_on_failure,
        });

        let batch_size = usize::try_from(if plan.batch_size == 0 {
            parts.settings.default_batch_size
        } else {
            plan.batch_size
        })
        .unwrap_or(1)
        .max(1);
        let pause_seconds = if plan.pause_seconds_between_batches == 0 {
            parts.settings.default_pause_seconds
        } else {
            plan.pause_seconds_between_batches
        };

        let device_ids = plan.device_ids.clone();
        let total = device_ids.len();
        let mut results: Vec<DeviceWorkResult> = Vec::with_capacity(total);
        let mut done = 0_usize;
        let mut cancelled = false;

        for (batch_index, batch) in device_ids.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if batch_index > 0 {
                tokio::time::sleep(Duration::from_secs(pause_seconds)).await;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for device_id in batch {
                let worker = Arc::clone(&worker_ctx);
                let device_id = device_id.clone();
                handles.push((
                    device_id.clone(),
                    tokio::spawn(async move { apply_device(worker, device_id).await }),
                ));
            }

            for (device_id, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(_) => DeviceWorkResult::failed(device_id, None, "device worker aborted"),
                };
                self.record_device_result(ctx, &plan, &job.id, &result);
                plan.device_statuses.insert(result.device_id.clone(), result.status);
                parts.plans.update_plan(&plan)?;

                done += 1;
                job.current_device_id = Some(result.device_id.clone());
                job.advance_progress(done, total);
                let _ = parts.jobs.update_job(&job);
                results.push(result);
            }
        }

        let final_status = if cancelled {
            PlanStatus::Cancelled
        } else {
            merge_terminal_status(&results)
        };
        parts.plan_service.update_plan_status(plan_id, final_status, &actor, ctx.tool.tier)?;

        let outcome = self.finish(&mut job, plan_id, final_status, results)?;
        Ok(outcome)
    }

    /// Builds the tracking job for a plan apply.
    fn new_job(&self, plan: &Plan) -> Job {
        let now = self.parts.clock.now();
        Job {
            id: JobId::new(random_id("job")),
            plan_id: Some(plan.id.clone()),
            job_type: JobType::ApplyPlan,
            status: JobStatus::Running,
            device_ids: plan.device_ids.clone(),
            attempts: 1,
            max_attempts: self.parts.settings.max_attempts,
            next_run_at: None,
            progress_percent: 0,
            current_device_id: None,
            result_summary: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Emits the per-device audit event for a worker result.
    fn record_device_result(
        &self,
        ctx: &AuthzContext,
        plan: &Plan,
        job_id: &JobId,
        result: &DeviceWorkResult,
    ) {
        let (action, audit_result) = match result.status {
            DeviceRunStatus::Completed => (AuditAction::ApplyDeviceSucceeded, AuditResult::Success),
            DeviceRunStatus::RolledBack => {
                (AuditAction::ApplyDeviceRolledBack, AuditResult::Failed)
            }
            _ => (AuditAction::ApplyDeviceFailed, AuditResult::Failed),
        };
        self.parts.recorder.record(AuditEventParams {
            user_sub: ctx.user.sub.clone(),
            user_id: Some(ctx.user.sub.as_str().to_string()),
            user_email: ctx.user.email.clone(),
            user_role: ctx.user.role_name.clone(),
            device_id: Some(result.device_id.clone()),
            environment: result.environment,
            action,
            tool_name: plan.tool_name.clone(),
            tool_tier: ctx.tool.tier,
            plan_id: Some(plan.id.clone()),
            job_id: Some(job_id.clone()),
            approver_id: None,
            approval_request_id: None,
            result: audit_result,
            meta: json!({
                "operation": plan.changes.operation(),
                "device_status": result.status,
                "rollback": result.rollback,
                "rollback_failed": result.status == DeviceRunStatus::RollbackFailed,
            }),
            error_message: result.error.clone(),
        });
    }

    /// Finalizes the job row and assembles the outcome.
    fn finish(
        &self,
        job: &mut Job,
        plan_id: &PlanId,
        final_status: PlanStatus,
        results: Vec<DeviceWorkResult>,
    ) -> Result<ApplyOutcome, ApplyError> {
        let device_results: Vec<DeviceApplyResult> = results
            .into_iter()
            .map(|result| DeviceApplyResult {
                device_id: result.device_id,
                status: result.status,
                error: result.error,
                rollback: result.rollback,
            })
            .collect();
        let successful_count = device_results
            .iter()
            .filter(|result| result.status == DeviceRunStatus::Completed)
            .count();
        let failed_count = device_results.len() - successful_count;
        let audit_write_failures = self.parts.recorder.failure_count();

        job.status = if final_status == PlanStatus::Completed {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        job.error_message = (job.status == JobStatus::Failed)
            .then(|| format!("plan finished {final_status}"));
        job.result_summary = Some(json!({
            "final_status": final_status,
            "successful_count": successful_count,
            "failed_count": failed_count,
            "audit_write_failures": audit_write_failures,
            "device_results": device_results,
        }));
        job.updated_at = self.parts.clock.now();
        let _ = self.parts.jobs.update_job(job);

        Ok(ApplyOutcome {
            plan_id: plan_id.clone(),
            job_id: job.id.clone(),
            final_status,
            successful_count,
            failed_count,
            device_results,
            audit_write_failures,
        })
    }
}

// ============================================================================
// SECTION: Terminal Merge
// ============================================================================

/// Merges per-device outcomes into the plan's terminal status.
fn merge_terminal_status(results: &[DeviceWorkResult]) -> PlanStatus {
    let any_rollback_failed =
        results.iter().any(|result| result.status == DeviceRunStatus::RollbackFailed);
    if any_rollback_failed {
        return PlanStatus::Failed;
    }
    let any_rolled_back =
        results.iter().any(|result| result.status == DeviceRunStatus::RolledBack);
    if any_rolled_back {
        return PlanStatus::RolledBack;
    }
    let any_failed = results.iter().any(|result| result.status != DeviceRunStatus::Completed);
    if any_failed {
        PlanStatus::Failed
    } else {
        PlanStatus::Completed
    }
}

// ============================================================================
// SECTION: Per-Device Protocol
// ============================================================================

/// Applies the plan's change to one device under the device deadline.
async fn apply_device(ctx: Arc<WorkerCtx>, device_id: DeviceId) -> DeviceWorkResult {
    let deadline = Duration::from_secs(ctx.settings.device_timeout_seconds);
    let fallback_id = device_id.clone();
    match tokio::time::timeout(deadline, run_device(&ctx, device_id)).await {
        Ok(result) => result,
        Err(_) => DeviceWorkResult::failed(
            fallback_id,
            None,
            format!("device deadline of {} s exceeded", ctx.settings.device_timeout_seconds),
        ),
    }
}

/// The atomic per-device unit: snapshot, mutate, health-check, rollback.
async fn run_device(ctx: &WorkerCtx, device_id: DeviceId) -> DeviceWorkResult {
    let engine = engine_for(ctx.changes.family());
    let max_attempts = ctx.settings.max_attempts;

    let device = match ctx.devices.get_device(&device_id) {
        Ok(Some(device)) => device,
        Ok(None) => {
            return DeviceWorkResult::failed(device_id, None, "device not found");
        }
        Err(error) => {
            return DeviceWorkResult::failed(device_id, None, format!("device lookup failed: {error}"));
        }
    };
    let environment = Some(device.environment);

    let credential = match ctx.credentials.active_credential(&device.id, CredentialKind::Rest) {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            return DeviceWorkResult::failed(device_id, environment, "no active rest credential");
        }
        Err(error) => {
            return DeviceWorkResult::failed(
                device_id,
                environment,
                format!("credential lookup failed: {error}"),
            );
        }
    };

    // Decrypt as late as possible; the material zeroizes when it drops.
    let secret = match ctx.cipher.decrypt(&credential.encrypted_secret) {
        Ok(secret) => secret,
        Err(error) => {
            return DeviceWorkResult::failed(device_id, environment, error.to_string());
        }
    };
    let mut transport = {
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            match ctx
                .transports
                .connect(&device, &credential, &secret, ctx.settings.transport_timeout_seconds)
                .await
            {
                Ok(transport) => break transport,
                Err(error) if error.is_retryable() && attempt < max_attempts => {}
                Err(error) => {
                    return DeviceWorkResult::failed(
                        device_id,
                        environment,
                        format!("transport connect failed: {error}"),
                    );
                }
            }
        }
    };
    drop(secret);

    // Snapshot the affected collection before any mutation.
    let collection = match get_with_retry(transport.as_mut(), engine.resource_path(), max_attempts).await
    {
        Ok(collection) => collection,
        Err(error) => {
            transport.close().await;
            return DeviceWorkResult::failed(
                device_id,
                environment,
                format!("snapshot fetch failed: {error}"),
            );
        }
    };
    let snapshot_objects: Vec<Value> =
        collection.as_array().cloned().unwrap_or_default();
    let snapshot = Snapshot {
        id: SnapshotId::new(random_id("snap")),
        device_id: device.id.clone(),
        timestamp: ctx.clock.now(),
        kind: engine.snapshot_kind(),
        data: serde_json::to_vec(&collection).unwrap_or_default(),
        meta: json!({
            "path": engine.resource_path(),
            "object_count": snapshot_objects.len(),
            "operation": ctx.changes.operation(),
        }),
    };
    if let Err(error) = ctx.snapshots.insert_snapshot(&snapshot) {
        transport.close().await;
        return DeviceWorkResult::failed(
            device_id,
            environment,
            format!("snapshot persistence failed: {error}"),
        );
    }

    // Mutate.
    let mutation = match engine.build_mutation(&ctx.changes) {
        Ok(mutation) => mutation,
        Err(error) => {
            transport.close().await;
            return DeviceWorkResult::failed(device_id, environment, error.to_string());
        }
    };
    let mut outcome = MutationOutcome::default();
    match run_mutation(transport.as_mut(), &mutation, max_attempts).await {
        Ok(response) => {
            if let Some(response) = response {
                outcome.created_id = object_id(&response);
            }
        }
        Err(error) => {
            let message = format!("mutation failed: {error}");
            return conclude_failure(
                ctx,
                engine,
                transport.as_mut(),
                device_id,
                environment,
                &snapshot,
                &snapshot_objects,
                &outcome,
                message,
            )
            .await;
        }
    }

    // Health check: system resources plus the mutated collection.
    let health_result = health_check(ctx, engine, transport.as_mut(), &device.id, &snapshot_objects, &outcome)
        .await;
    match health_result {
        Ok(()) => {
            transport.close().await;
            DeviceWorkResult {
                device_id,
                environment,
                status: DeviceRunStatus::Completed,
                error: None,
                rollback: None,
            }
        }
        Err(message) => {
            conclude_failure(
                ctx,
                engine,
                transport.as_mut(),
                device_id,
                environment,
                &snapshot,
                &snapshot_objects,
                &outcome,
                message,
            )
            .await
        }
    }
}

/// Handles a post-mutation failure: rollback when enabled, plain failure
/// otherwise.
#[allow(
    clippy::too_many_arguments,
    reason = "The failure path needs the full device context exactly once."
)]
async fn conclude_failure(
    ctx: &WorkerCtx,
    engine: &'static dyn FamilyEngine,
    transport: &mut dyn DeviceTransport,
    device_id: DeviceId,
    environment: Option<Environment>,
    snapshot: &Snapshot,
    snapshot_objects: &[Value],
    outcome: &MutationOutcome,
    message: String,
) -> DeviceWorkResult {
    if !ctx.rollback_on_failure {
        transport.close().await;
        return DeviceWorkResult::failed(device_id, environment, message);
    }

    let mutations = match engine.build_rollback(&ctx.changes, snapshot_objects, outcome) {
        Ok(mutations) => mutations,
        Err(error) => {
            transport.close().await;
            return DeviceWorkResult::failed(
                device_id,
                environment,
                format!("{message}; rollback not attempted: {error}"),
            );
        }
    };
    for mutation in &mutations {
        if let Err(error) = run_mutation(transport, mutation, ctx.settings.max_attempts).await {
            transport.close().await;
            return DeviceWorkResult {
                device_id,
                environment,
                status: DeviceRunStatus::RollbackFailed,
                error: Some(format!("{message}; rollback failed: {error}")),
                rollback: Some(RollbackInfo {
                    snapshot_id: snapshot.id.clone(),
                    restored: false,
                }),
            };
        }
    }
    transport.close().await;
    DeviceWorkResult {
        device_id,
        environment,
        status: DeviceRunStatus::RolledBack,
        error: Some(message),
        rollback: Some(RollbackInfo {
            snapshot_id: snapshot.id.clone(),
            restored: true,
        }),
    }
}

/// Runs the post-change health check and persists the sample.
///
/// # Errors
///
/// Returns a human-readable failure message when the check does not verify.
async fn health_check(
    ctx: &WorkerCtx,
    engine: &'static dyn FamilyEngine,
    transport: &mut dyn DeviceTransport,
    device_id: &DeviceId,
    snapshot_objects: &[Value],
    outcome: &MutationOutcome,
) -> Result<(), String> {
    let max_attempts = ctx.settings.max_attempts;
    let resource = get_with_retry(transport, "system/resource", max_attempts).await;
    let collection = get_with_retry(transport, engine.resource_path(), max_attempts).await;

    let (verdict, resource_value) = match (&resource, &collection) {
        (Ok(resource_value), Ok(collection_value)) => {
            let uptime_present = resource_value
                .as_object()
                .is_some_and(|object| object.get("uptime").is_some_and(|u| !u.is_null()));
            let collection_ok = engine.verify_collection(
                collection_value,
                snapshot_objects,
                outcome,
                &ctx.changes,
            );
            if uptime_present && collection_ok {
                (Ok(()), Some(resource_value))
            } else if uptime_present {
                (Err("health check failed: mutated collection did not verify".to_string()), Some(resource_value))
            } else {
                (Err("health check failed: system resource missing uptime".to_string()), Some(resource_value))
            }
        }
        (Err(error), _) => (Err(format!("health check failed: {error}")), None),
        (_, Err(error)) => (Err(format!("health check failed: {error}")), None),
    };

    let sample = HealthCheck {
        id: random_id("health"),
        device_id: device_id.clone(),
        timestamp: ctx.clock.now(),
        status: if verdict.is_ok() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Failed
        },
        cpu_usage_percent: resource_value
            .and_then(|value| value.get("cpu-load"))
            .and_then(json_number),
        memory_used_bytes: resource_value
            .and_then(|value| value.get("free-memory"))
            .and_then(json_integer)
            .and_then(|free| {
                resource_value
                    .and_then(|value| value.get("total-memory"))
                    .and_then(json_integer)
                    .map(|total| total.saturating_sub(free))
            }),
        memory_total_bytes: resource_value
            .and_then(|value| value.get("total-memory"))
            .and_then(json_integer),
        uptime_seconds: resource_value
            .and_then(|value| value.get("uptime"))
            .and_then(Value::as_i64),
        error_message: verdict.as_ref().err().cloned(),
    };
    let _ = ctx.health.insert_health_check(&sample);

    verdict
}

/// Extracts a numeric value from a JSON number or numeric string.
fn json_number(value: &Value) -> Option<f64> {
    value.as_f64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Extracts an integer value from a JSON number or numeric string.
fn json_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

// ============================================================================
// SECTION: Transport Retries
// ============================================================================

/// Fetches a path, retrying transient transport errors.
async fn get_with_retry(
    transport: &mut dyn DeviceTransport,
    path: &str,
    max_attempts: u32,
) -> Result<Value, TransportError> {
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        match transport.get(path).await {
            Err(error) if error.is_retryable() && attempt < max_attempts => {}
            other => return other,
        }
    }
}

/// Executes a mutation, retrying transient transport errors.
///
/// Returns the device's representation of a created object for posts.
async fn run_mutation(
    transport: &mut dyn DeviceTransport,
    mutation: &Mutation,
    max_attempts: u32,
) -> Result<Option<Value>, TransportError> {
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        let result = match mutation {
            Mutation::Post {
                path,
                body,
            } => transport.post(path, body).await.map(Some),
            Mutation::Patch {
                path,
                body,
            } => transport.patch(path, body).await.map(|_| None),
            Mutation::Delete {
                path,
            } => transport.delete(path).await.map(|()| None),
        };
        match result {
            Err(error) if error.is_retryable() && attempt < max_attempts => {}
            other => return other,
        }
    }
}
