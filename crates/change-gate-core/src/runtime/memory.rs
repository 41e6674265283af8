// change-gate-core/src/runtime/memory.rs
// ============================================================================
// Module: Change Gate In-Memory Backends
// Description: Deterministic in-memory stores, clock, and cipher.
// Purpose: Back tests and local demos without external dependencies.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides in-memory implementations of every store seam plus a
//! manually-advanced clock and a passthrough cipher. They are deterministic
//! and intended for tests and local demos, not production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use crate::core::AuditEvent;
use crate::core::Credential;
use crate::core::CredentialKind;
use crate::core::Device;
use crate::core::DeviceFilter;
use crate::core::DeviceId;
use crate::core::HealthCheck;
use crate::core::Job;
use crate::core::JobId;
use crate::core::Permission;
use crate::core::Plan;
use crate::core::PlanId;
use crate::core::PlanStatus;
use crate::core::RoleName;
use crate::core::SecretMaterial;
use crate::core::Snapshot;
use crate::core::SnapshotId;
use crate::core::Timestamp;
use crate::core::User;
use crate::core::UserSub;
use crate::core::rbac::Role;
use crate::interfaces::AuditStore;
use crate::interfaces::CipherError;
use crate::interfaces::Clock;
use crate::interfaces::CredentialStore;
use crate::interfaces::DeviceStore;
use crate::interfaces::HealthCheckStore;
use crate::interfaces::JobStore;
use crate::interfaces::PlanStore;
use crate::interfaces::RbacStore;
use crate::interfaces::SecretCipher;
use crate::interfaces::SnapshotStore;
use crate::interfaces::StoreError;
use crate::interfaces::UserStore;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a poisoned mutex into a store error.
fn poisoned() -> StoreError {
    StoreError::Store("in-memory store mutex poisoned".to_string())
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory implementation of every store seam.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    /// Device records keyed by id.
    devices: Arc<Mutex<BTreeMap<DeviceId, Device>>>,
    /// Credential records keyed by id string.
    credentials: Arc<Mutex<Vec<Credential>>>,
    /// Plan records keyed by id.
    plans: Arc<Mutex<BTreeMap<PlanId, Plan>>>,
    /// Job records keyed by id.
    jobs: Arc<Mutex<BTreeMap<JobId, Job>>>,
    /// Snapshot records keyed by id.
    snapshots: Arc<Mutex<BTreeMap<SnapshotId, Snapshot>>>,
    /// Health samples in insertion order.
    health: Arc<Mutex<Vec<HealthCheck>>>,
    /// Audit events in insertion order.
    audit: Arc<Mutex<Vec<AuditEvent>>>,
    /// User records keyed by subject.
    users: Arc<Mutex<BTreeMap<UserSub, User>>>,
    /// Role records keyed by name.
    roles: Arc<Mutex<BTreeMap<RoleName, Role>>>,
    /// Permissions granted per role name.
    role_permissions: Arc<Mutex<BTreeMap<RoleName, Vec<Permission>>>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a role and its permissions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is poisoned.
    pub fn seed_role(&self, role: Role, permissions: Vec<Permission>) -> Result<(), StoreError> {
        self.roles.lock().map_err(|_| poisoned())?.insert(role.name.clone(), role.clone());
        self.role_permissions.lock().map_err(|_| poisoned())?.insert(role.name, permissions);
        Ok(())
    }

    /// Returns the number of persisted plans.
    #[must_use]
    pub fn plan_count(&self) -> usize {
        self.plans.lock().map(|plans| plans.len()).unwrap_or(0)
    }

    /// Returns every audit event in insertion order.
    #[must_use]
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns every persisted snapshot.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().map(|snaps| snaps.values().cloned().collect()).unwrap_or_default()
    }
}

impl DeviceStore for MemoryStore {
    fn get_device(&self, device_id: &DeviceId) -> Result<Option<Device>, StoreError> {
        Ok(self.devices.lock().map_err(|_| poisoned())?.get(device_id).cloned())
    }

    fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .devices
            .lock()
            .map_err(|_| poisoned())?
            .values()
            .filter(|device| filter.matches(device))
            .cloned()
            .collect())
    }

    fn upsert_device(&self, device: &Device) -> Result<(), StoreError> {
        self.devices
            .lock()
            .map_err(|_| poisoned())?
            .insert(device.id.clone(), device.clone());
        Ok(())
    }
}

impl CredentialStore for MemoryStore {
    fn active_credential(
        &self,
        device_id: &DeviceId,
        kind: CredentialKind,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .lock()
            .map_err(|_| poisoned())?
            .iter()
            .find(|credential| {
                credential.device_id == *device_id && credential.kind == kind && credential.active
            })
            .cloned())
    }

    fn upsert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut credentials = self.credentials.lock().map_err(|_| poisoned())?;
        if credential.active {
            for existing in credentials.iter_mut() {
                if existing.device_id == credential.device_id && existing.kind == credential.kind {
                    existing.active = false;
                }
            }
        }
        credentials.retain(|existing| existing.id != credential.id);
        credentials.push(credential.clone());
        Ok(())
    }
}

impl PlanStore for MemoryStore {
    fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut plans = self.plans.lock().map_err(|_| poisoned())?;
        if plans.contains_key(&plan.id) {
            return Err(StoreError::Conflict(format!("plan '{}' already exists", plan.id)));
        }
        if let Some(token) = plan.approval_token.as_deref()
            && plans
                .values()
                .any(|existing| existing.approval_token.as_deref() == Some(token))
        {
            return Err(StoreError::Conflict("approval token already in use".to_string()));
        }
        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StoreError> {
        Ok(self.plans.lock().map_err(|_| poisoned())?.get(plan_id).cloned())
    }

    fn update_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut plans = self.plans.lock().map_err(|_| poisoned())?;
        if !plans.contains_key(&plan.id) {
            return Err(StoreError::Invalid(format!("plan '{}' does not exist", plan.id)));
        }
        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    fn transition_plan_status(
        &self,
        plan_id: &PlanId,
        expected: PlanStatus,
        next: PlanStatus,
        approved_by: Option<&UserSub>,
        updated_at: Timestamp,
    ) -> Result<Plan, StoreError> {
        let mut plans = self.plans.lock().map_err(|_| poisoned())?;
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| StoreError::Invalid(format!("plan '{plan_id}' does not exist")))?;
        if plan.status != expected {
            return Err(StoreError::Conflict(format!(
                "plan '{plan_id}' is '{}', expected '{expected}'",
                plan.status
            )));
        }
        plan.status = next;
        plan.updated_at = updated_at;
        if next == PlanStatus::Approved {
            plan.approved_by = approved_by.cloned();
            plan.approved_at = Some(updated_at);
        }
        Ok(plan.clone())
    }
}

impl JobStore for MemoryStore {
    fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.lock().map_err(|_| poisoned())?.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().map_err(|_| poisoned())?.get(job_id).cloned())
    }

    fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        if job.progress_percent > 100 {
            return Err(StoreError::Invalid("progress_percent exceeds 100".to_string()));
        }
        if job.attempts > job.max_attempts {
            return Err(StoreError::Invalid("attempts exceed max_attempts".to_string()));
        }
        self.jobs.lock().map_err(|_| poisoned())?.insert(job.id.clone(), job.clone());
        Ok(())
    }
}

impl SnapshotStore for MemoryStore {
    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshots
            .lock()
            .map_err(|_| poisoned())?
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    fn get_snapshot(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshots.lock().map_err(|_| poisoned())?.get(snapshot_id).cloned())
    }
}

impl HealthCheckStore for MemoryStore {
    fn insert_health_check(&self, check: &HealthCheck) -> Result<(), StoreError> {
        self.health.lock().map_err(|_| poisoned())?.push(check.clone());
        Ok(())
    }

    fn health_checks_for_device(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<HealthCheck>, StoreError> {
        Ok(self
            .health
            .lock()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|check| check.device_id == *device_id)
            .cloned()
            .collect())
    }
}

impl AuditStore for MemoryStore {
    fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.audit.lock().map_err(|_| poisoned())?.push(event.clone());
        Ok(())
    }

    fn events_for_plan(&self, plan_id: &PlanId) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .audit
            .lock()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|event| event.plan_id.as_ref() == Some(plan_id))
            .cloned()
            .collect())
    }
}

impl UserStore for MemoryStore {
    fn get_user(&self, sub: &UserSub) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().map_err(|_| poisoned())?.get(sub).cloned())
    }

    fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.lock().map_err(|_| poisoned())?.insert(user.sub.clone(), user.clone());
        Ok(())
    }
}

impl RbacStore for MemoryStore {
    fn role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        Ok(self.roles.lock().map_err(|_| poisoned())?.get(name).cloned())
    }

    fn permissions_for_role(&self, name: &RoleName) -> Result<Vec<Permission>, StoreError> {
        Ok(self
            .role_permissions
            .lock()
            .map_err(|_| poisoned())?
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Manual Clock
// ============================================================================

/// Manually-advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current instant in unix milliseconds.
    now_millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock pinned to the given instant.
    #[must_use]
    pub fn at(timestamp: Timestamp) -> Self {
        Self {
            now_millis: AtomicI64::new(timestamp.as_unix_millis()),
        }
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.now_millis.fetch_add(millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_millis.load(Ordering::Relaxed))
    }
}

// ============================================================================
// SECTION: Passthrough Cipher
// ============================================================================

/// Cipher that treats ciphertext as plaintext, for tests and demos.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCipher;

impl SecretCipher for PassthroughCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretMaterial, CipherError> {
        Ok(SecretMaterial::new(ciphertext.to_string()))
    }
}
