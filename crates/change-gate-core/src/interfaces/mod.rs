// change-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Change Gate Interfaces
// Description: Backend-agnostic seams for persistence, time, secrets, devices.
// Purpose: Define the contract surfaces the change-control core depends on.
// Dependencies: crate::core, async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the core integrates with external systems without
//! embedding backend-specific details. Persistence is the only shared mutable
//! state; everything else (clock, cipher, transports) is injected per call
//! site. Implementations must fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

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

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Persistence layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Optimistic check or uniqueness constraint failed.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Device Registry Store
// ============================================================================

/// Device registry reads and administrative writes.
pub trait DeviceStore {
    /// Loads a device by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_device(&self, device_id: &DeviceId) -> Result<Option<Device>, StoreError>;

    /// Lists devices matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError>;

    /// Inserts or replaces a device record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails.
    fn upsert_device(&self, device: &Device) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Credential Store
// ============================================================================

/// Encrypted credential retrieval keyed by device and kind.
pub trait CredentialStore {
    /// Loads the active credential for a device and kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn active_credential(
        &self,
        device_id: &DeviceId,
        kind: CredentialKind,
    ) -> Result<Option<Credential>, StoreError>;

    /// Inserts or replaces a credential, deactivating any previously active
    /// credential for the same `(device_id, kind)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails.
    fn upsert_credential(&self, credential: &Credential) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Plan Store
// ============================================================================

/// Plan persistence with guarded status transitions.
pub trait PlanStore {
    /// Inserts a new plan row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the plan id or approval token is
    /// already in use, and other [`StoreError`] kinds on I/O failure.
    fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    /// Loads a plan by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StoreError>;

    /// Replaces a plan row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails.
    fn update_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    /// Atomically moves a plan from `expected` to `next`, recording approval
    /// fields and the update timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the stored status is not
    /// `expected`, and other [`StoreError`] kinds on I/O failure.
    fn transition_plan_status(
        &self,
        plan_id: &PlanId,
        expected: PlanStatus,
        next: PlanStatus,
        approved_by: Option<&UserSub>,
        updated_at: Timestamp,
    ) -> Result<Plan, StoreError>;
}

// ============================================================================
// SECTION: Job Store
// ============================================================================

/// Job persistence for long-running apply tracking.
pub trait JobStore {
    /// Inserts a new job row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails.
    fn insert_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Loads a job by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Replaces a job row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `progress_percent` exceeds 100 or
    /// `attempts` exceeds `max_attempts`, and other kinds on I/O failure.
    fn update_job(&self, job: &Job) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Snapshot Store
// ============================================================================

/// Snapshot persistence for rollback sources.
pub trait SnapshotStore {
    /// Inserts a snapshot row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails.
    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Loads a snapshot by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_snapshot(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>, StoreError>;
}

// ============================================================================
// SECTION: Health Check Store
// ============================================================================

/// Post-change health sample persistence.
pub trait HealthCheckStore {
    /// Inserts a health sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails. Callers treat health
    /// persistence as best-effort; the rollback decision never depends on it.
    fn insert_health_check(&self, check: &HealthCheck) -> Result<(), StoreError>;

    /// Lists health samples recorded for a device, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn health_checks_for_device(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<HealthCheck>, StoreError>;
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Append-only audit event persistence.
pub trait AuditStore {
    /// Appends an audit event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails. Callers treat audit
    /// writes as best-effort but must count and surface failures.
    fn append(&self, event: &AuditEvent) -> Result<(), StoreError>;

    /// Lists audit events recorded for a plan, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn events_for_plan(&self, plan_id: &PlanId) -> Result<Vec<AuditEvent>, StoreError>;
}

// ============================================================================
// SECTION: User and RBAC Stores
// ============================================================================

/// User record retrieval.
pub trait UserStore {
    /// Loads a user by subject.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_user(&self, sub: &UserSub) -> Result<Option<User>, StoreError>;

    /// Inserts or replaces a user record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails.
    fn upsert_user(&self, user: &User) -> Result<(), StoreError>;
}

/// Role and permission retrieval.
pub trait RbacStore {
    /// Loads a role by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError>;

    /// Expands a role to its permission rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when expansion fails.
    fn permissions_for_role(&self, name: &RoleName) -> Result<Vec<Permission>, StoreError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source injected into services.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock backed [`Clock`] for hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

// ============================================================================
// SECTION: Secret Cipher
// ============================================================================

/// Secret decryption errors.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Ciphertext failed to decrypt or authenticate.
    #[error("secret decryption failed: {0}")]
    Decrypt(String),
}

/// Decryption primitive for credential ciphertext.
///
/// The concrete cipher lives outside the core; implementations must
/// authenticate ciphertext and fail closed.
pub trait SecretCipher {
    /// Decrypts ciphertext into bounded-lifetime secret material.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] when decryption or authentication fails.
    fn decrypt(&self, ciphertext: &str) -> Result<SecretMaterial, CipherError>;
}

// ============================================================================
// SECTION: Device Transport
// ============================================================================

/// Device transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("transport connect error: {0}")]
    Connect(String),
    /// The call exceeded its deadline.
    #[error("transport timeout after {0} ms")]
    Timeout(u64),
    /// The device returned an error status.
    #[error("device returned status {status}")]
    Status {
        /// HTTP-style status code reported by the device.
        status: u16,
    },
    /// The response could not be interpreted.
    #[error("transport protocol error: {0}")]
    Protocol(String),
    /// The transport was already closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns true for transient failures worth retrying.
    ///
    /// Connection errors, timeouts, and 5xx statuses are transient; 4xx
    /// statuses and protocol errors terminate the device immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) => true,
            Self::Status { status } => *status >= 500,
            Self::Protocol(_) | Self::Closed => false,
        }
    }
}

/// Pluggable per-device client.
///
/// Transports are created per device and per apply, and never reused across
/// plans. Paths are device-API resource paths such as `ip/firewall/filter`.
#[async_trait]
pub trait DeviceTransport: Send + fmt::Debug {
    /// Fetches a resource collection or object.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the call fails.
    async fn get(&mut self, path: &str) -> Result<Value, TransportError>;

    /// Creates an object and returns the device's representation of it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the call fails.
    async fn post(&mut self, path: &str, body: &Value) -> Result<Value, TransportError>;

    /// Patches an object in place and returns the updated representation.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the call fails.
    async fn patch(&mut self, path: &str, body: &Value) -> Result<Value, TransportError>;

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the call fails.
    async fn delete(&mut self, path: &str) -> Result<(), TransportError>;

    /// Closes the transport. Subsequent calls return [`TransportError::Closed`].
    async fn close(&mut self);
}

/// Factory resolving a transport for a device using its active credential.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Connects to the device and authenticates with the decrypted secret.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when connection or authentication fails.
    async fn connect(
        &self,
        device: &Device,
        credential: &Credential,
        secret: &SecretMaterial,
        timeout_seconds: u64,
    ) -> Result<Box<dyn DeviceTransport>, TransportError>;
}
