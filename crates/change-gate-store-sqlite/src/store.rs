// change-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Change-Control Store
// Description: Durable store for devices, credentials, plans, jobs, audit.
// Purpose: Persist the §-complete data model with WAL and strict constraints.
// Dependencies: change-gate-core, rand, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every entity row keeps its indexed key columns alongside a JSON `record`
//! column holding the full serialized value, so reads reconstruct exactly
//! what services persisted. Constraints enforce the model invariants the
//! services rely on: unique approval tokens, one active credential per
//! `(device_id, kind)`, bounded job progress, and audit foreign keys that
//! null out instead of deleting history. Loads fail closed on corrupt JSON.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use change_gate_core::AuditEvent;
use change_gate_core::Credential;
use change_gate_core::CredentialKind;
use change_gate_core::Device;
use change_gate_core::DeviceFilter;
use change_gate_core::DeviceId;
use change_gate_core::HealthCheck;
use change_gate_core::HealthStatus;
use change_gate_core::Job;
use change_gate_core::JobId;
use change_gate_core::Permission;
use change_gate_core::Plan;
use change_gate_core::PlanId;
use change_gate_core::PlanStatus;
use change_gate_core::RoleName;
use change_gate_core::Snapshot;
use change_gate_core::SnapshotId;
use change_gate_core::SnapshotKind;
use change_gate_core::StoreError;
use change_gate_core::Timestamp;
use change_gate_core::User;
use change_gate_core::UserSub;
use change_gate_core::core::rbac::Role;
use change_gate_core::interfaces::AuditStore;
use change_gate_core::interfaces::CredentialStore;
use change_gate_core::interfaces::DeviceStore;
use change_gate_core::interfaces::HealthCheckStore;
use change_gate_core::interfaces::JobStore;
use change_gate_core::interfaces::PlanStore;
use change_gate_core::interfaces::RbacStore;
use change_gate_core::interfaces::SnapshotStore;
use change_gate_core::interfaces::UserStore;
use rand::RngCore;
use rand::rngs::OsRng;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized record size accepted by the store.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Default roles seeded at schema creation.
const DEFAULT_ROLES: &[(&str, &str)] = &[
    ("read_only", "Read-only access to fundamental tier tools."),
    ("ops_rw", "Read-write access to advanced tier tools."),
    ("admin", "Full access to all tools and administrative functions."),
    ("approver", "Can approve professional tier plans."),
];

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for the given path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// A uniqueness or optimistic-check conflict.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Store corruption or undecodable record payloads.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a rusqlite error, classifying constraint violations as conflicts.
fn map_db_error(error: &rusqlite::Error) -> SqliteStoreError {
    if let rusqlite::Error::SqliteFailure(failure, message) = error
        && failure.code == ErrorCode::ConstraintViolation
    {
        return SqliteStoreError::Conflict(
            message.clone().unwrap_or_else(|| "constraint violation".to_string()),
        );
    }
    SqliteStoreError::Db(error.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed store implementing every change-gate store seam.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens the store, creating and seeding the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }

    /// Registers a role and replaces its permission grants.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when persistence fails.
    pub fn seed_role(
        &self,
        role: &Role,
        permissions: &[Permission],
    ) -> Result<(), SqliteStoreError> {
        let mut connection = self.lock()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| map_db_error(&err))?;
        tx.execute(
            "INSERT INTO roles (id, name, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET description = excluded.description",
            params![role.id, role.name.as_str(), role.description],
        )
        .map_err(|err| map_db_error(&err))?;
        tx.execute(
            "DELETE FROM role_permissions WHERE role_id IN (SELECT id FROM roles WHERE name = ?1)",
            params![role.name.as_str()],
        )
        .map_err(|err| map_db_error(&err))?;
        for permission in permissions {
            tx.execute(
                "INSERT INTO permissions (id, resource_type, resource_id, action, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   resource_type = excluded.resource_type,
                   resource_id = excluded.resource_id,
                   action = excluded.action,
                   description = excluded.description",
                params![
                    permission.id,
                    permission.resource_type.as_str(),
                    permission.resource_id,
                    permission.action.as_str(),
                    permission.description,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
            tx.execute(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id)
                 SELECT id, ?2 FROM roles WHERE name = ?1",
                params![role.name.as_str(), permission.id],
            )
            .map_err(|err| map_db_error(&err))?;
        }
        tx.commit().map_err(|err| map_db_error(&err))
    }
}

// ============================================================================
// SECTION: Record Codec
// ============================================================================

/// Serializes a record into its JSON column payload.
fn encode_record<T: Serialize>(record: &T) -> Result<String, SqliteStoreError> {
    let json =
        serde_json::to_string(record).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if json.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::Invalid(format!(
            "record exceeds size limit: {} bytes (max {MAX_RECORD_BYTES})",
            json.len()
        )));
    }
    Ok(json)
}

/// Deserializes a JSON column payload, failing closed on corruption.
fn decode_record<T: DeserializeOwned>(json: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(json).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

// ============================================================================
// SECTION: Device Store
// ============================================================================

impl DeviceStore for SqliteStore {
    fn get_device(&self, device_id: &DeviceId) -> Result<Option<Device>, StoreError> {
        let connection = self.lock()?;
        let json: Option<String> = connection
            .query_row(
                "SELECT record FROM devices WHERE id = ?1",
                params![device_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| map_db_error(&err))?;
        json.map(|json| decode_record(&json)).transpose().map_err(StoreError::from)
    }

    fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT record FROM devices ORDER BY id")
            .map_err(|err| map_db_error(&err))?;
        let rows = statement
            .query_map(params![], |row| row.get::<_, String>(0))
            .map_err(|err| map_db_error(&err))?;
        let mut devices = Vec::new();
        for row in rows {
            let json = row.map_err(|err| map_db_error(&err))?;
            let device: Device = decode_record(&json)?;
            if filter.matches(&device) {
                devices.push(device);
            }
        }
        Ok(devices)
    }

    fn upsert_device(&self, device: &Device) -> Result<(), StoreError> {
        let json = encode_record(device)?;
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO devices (id, name, environment, status, record)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   environment = excluded.environment,
                   status = excluded.status,
                   record = excluded.record",
                params![
                    device.id.as_str(),
                    device.name,
                    device.environment.as_str(),
                    device.status.as_str(),
                    json,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Credential Store
// ============================================================================

impl CredentialStore for SqliteStore {
    fn active_credential(
        &self,
        device_id: &DeviceId,
        kind: CredentialKind,
    ) -> Result<Option<Credential>, StoreError> {
        let connection = self.lock()?;
        let json: Option<String> = connection
            .query_row(
                "SELECT record FROM credentials
                 WHERE device_id = ?1 AND kind = ?2 AND active = 1",
                params![device_id.as_str(), kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| map_db_error(&err))?;
        json.map(|json| decode_record(&json)).transpose().map_err(StoreError::from)
    }

    fn upsert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut connection = self.lock()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| map_db_error(&err))?;
        if credential.active {
            // Deactivate the previous active credential for this pair; the
            // record column is rewritten so reads stay consistent.
            let rows: Vec<(String, String)> = {
                let mut statement = tx
                    .prepare(
                        "SELECT id, record FROM credentials
                         WHERE device_id = ?1 AND kind = ?2 AND active = 1",
                    )
                    .map_err(|err| map_db_error(&err))?;
                let mapped = statement
                    .query_map(
                        params![credential.device_id.as_str(), credential.kind.as_str()],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                    )
                    .map_err(|err| map_db_error(&err))?;
                let mut rows = Vec::new();
                for row in mapped {
                    rows.push(row.map_err(|err| map_db_error(&err))?);
                }
                rows
            };
            for (id, json) in rows {
                let mut existing: Credential = decode_record(&json)?;
                existing.active = false;
                let json = encode_record(&existing)?;
                tx.execute(
                    "UPDATE credentials SET active = 0, record = ?2 WHERE id = ?1",
                    params![id, json],
                )
                .map_err(|err| map_db_error(&err))?;
            }
        }
        let json = encode_record(credential)?;
        tx.execute(
            "INSERT INTO credentials (id, device_id, kind, active, record)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               device_id = excluded.device_id,
               kind = excluded.kind,
               active = excluded.active,
               record = excluded.record",
            params![
                credential.id.as_str(),
                credential.device_id.as_str(),
                credential.kind.as_str(),
                i64::from(credential.active),
                json,
            ],
        )
        .map_err(|err| map_db_error(&err))?;
        tx.commit().map_err(|err| map_db_error(&err))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Plan Store
// ============================================================================

impl PlanStore for SqliteStore {
    fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let json = encode_record(plan)?;
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO plans (id, created_by, status, approval_token, record)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    plan.id.as_str(),
                    plan.created_by.as_str(),
                    plan.status.as_str(),
                    plan.approval_token,
                    json,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }

    fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StoreError> {
        let connection = self.lock()?;
        let json: Option<String> = connection
            .query_row(
                "SELECT record FROM plans WHERE id = ?1",
                params![plan_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| map_db_error(&err))?;
        json.map(|json| decode_record(&json)).transpose().map_err(StoreError::from)
    }

    fn update_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let json = encode_record(plan)?;
        let connection = self.lock()?;
        let updated = connection
            .execute(
                "UPDATE plans SET created_by = ?2, status = ?3, approval_token = ?4, record = ?5
                 WHERE id = ?1",
                params![
                    plan.id.as_str(),
                    plan.created_by.as_str(),
                    plan.status.as_str(),
                    plan.approval_token,
                    json,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        if updated == 0 {
            return Err(StoreError::Invalid(format!("plan '{}' does not exist", plan.id)));
        }
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
        let mut connection = self.lock()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| map_db_error(&err))?;
        let json: Option<String> = tx
            .query_row(
                "SELECT record FROM plans WHERE id = ?1",
                params![plan_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| map_db_error(&err))?;
        let Some(json) = json else {
            return Err(StoreError::Invalid(format!("plan '{plan_id}' does not exist")));
        };
        let mut plan: Plan = decode_record(&json)?;
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
        let json = encode_record(&plan)?;
        tx.execute(
            "UPDATE plans SET status = ?2, record = ?3 WHERE id = ?1",
            params![plan_id.as_str(), plan.status.as_str(), json],
        )
        .map_err(|err| map_db_error(&err))?;
        tx.commit().map_err(|err| map_db_error(&err))?;
        Ok(plan)
    }
}

// ============================================================================
// SECTION: Job Store
// ============================================================================

impl JobStore for SqliteStore {
    fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let json = encode_record(job)?;
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO jobs (id, plan_id, status, progress_percent, record)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    job.id.as_str(),
                    job.plan_id.as_ref().map(PlanId::as_str),
                    job.status.as_str(),
                    i64::from(job.progress_percent),
                    json,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        let connection = self.lock()?;
        let json: Option<String> = connection
            .query_row(
                "SELECT record FROM jobs WHERE id = ?1",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| map_db_error(&err))?;
        json.map(|json| decode_record(&json)).transpose().map_err(StoreError::from)
    }

    fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        if job.progress_percent > 100 {
            return Err(StoreError::Invalid("progress_percent exceeds 100".to_string()));
        }
        if job.attempts > job.max_attempts {
            return Err(StoreError::Invalid("attempts exceed max_attempts".to_string()));
        }
        let json = encode_record(job)?;
        let connection = self.lock()?;
        let updated = connection
            .execute(
                "UPDATE jobs SET plan_id = ?2, status = ?3, progress_percent = ?4, record = ?5
                 WHERE id = ?1",
                params![
                    job.id.as_str(),
                    job.plan_id.as_ref().map(PlanId::as_str),
                    job.status.as_str(),
                    i64::from(job.progress_percent),
                    json,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        if updated == 0 {
            return Err(StoreError::Invalid(format!("job '{}' does not exist", job.id)));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Snapshot Store
// ============================================================================

impl SnapshotStore for SqliteStore {
    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let meta = serde_json::to_string(&snapshot.meta)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO snapshots (id, device_id, timestamp, kind, data, meta)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot.id.as_str(),
                    snapshot.device_id.as_str(),
                    snapshot.timestamp.as_unix_millis(),
                    snapshot.kind.as_str(),
                    snapshot.data,
                    meta,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }

    fn get_snapshot(&self, snapshot_id: &SnapshotId) -> Result<Option<Snapshot>, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT id, device_id, timestamp, kind, data, meta
                 FROM snapshots WHERE id = ?1",
                params![snapshot_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| map_db_error(&err))?
            .map(|(id, device_id, timestamp, kind, data, meta)| {
                let kind: SnapshotKind = decode_record(&format!("\"{kind}\""))?;
                let meta = serde_json::from_str(&meta)
                    .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
                Ok::<Snapshot, SqliteStoreError>(Snapshot {
                    id: SnapshotId::new(id),
                    device_id: DeviceId::new(device_id),
                    timestamp: Timestamp::from_unix_millis(timestamp),
                    kind,
                    data,
                    meta,
                })
            })
            .transpose()
            .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Health Check Store
// ============================================================================

impl HealthCheckStore for SqliteStore {
    fn insert_health_check(&self, check: &HealthCheck) -> Result<(), StoreError> {
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO health_checks
                   (id, device_id, timestamp, status, cpu_usage_percent,
                    memory_used_bytes, memory_total_bytes, uptime_seconds, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    check.id,
                    check.device_id.as_str(),
                    check.timestamp.as_unix_millis(),
                    check.status.as_str(),
                    check.cpu_usage_percent,
                    check.memory_used_bytes,
                    check.memory_total_bytes,
                    check.uptime_seconds,
                    check.error_message,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }

    fn health_checks_for_device(
        &self,
        device_id: &DeviceId,
    ) -> Result<Vec<HealthCheck>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT id, device_id, timestamp, status, cpu_usage_percent,
                        memory_used_bytes, memory_total_bytes, uptime_seconds, error_message
                 FROM health_checks WHERE device_id = ?1 ORDER BY timestamp",
            )
            .map_err(|err| map_db_error(&err))?;
        let rows = statement
            .query_map(params![device_id.as_str()], |row| {
                Ok(HealthCheck {
                    id: row.get(0)?,
                    device_id: DeviceId::new(row.get::<_, String>(1)?),
                    timestamp: Timestamp::from_unix_millis(row.get(2)?),
                    status: if row.get::<_, String>(3)? == "healthy" {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Failed
                    },
                    cpu_usage_percent: row.get(4)?,
                    memory_used_bytes: row.get(5)?,
                    memory_total_bytes: row.get(6)?,
                    uptime_seconds: row.get(7)?,
                    error_message: row.get(8)?,
                })
            })
            .map_err(|err| map_db_error(&err))?;
        let mut checks = Vec::new();
        for row in rows {
            checks.push(row.map_err(|err| map_db_error(&err))?);
        }
        Ok(checks)
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

impl AuditStore for SqliteStore {
    fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let json = encode_record(event)?;
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO audit_events (id, timestamp, plan_id, device_id, record)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.id.as_str(),
                    event.timestamp.as_unix_millis(),
                    event.plan_id.as_ref().map(PlanId::as_str),
                    event.device_id.as_ref().map(DeviceId::as_str),
                    json,
                ],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }

    fn events_for_plan(&self, plan_id: &PlanId) -> Result<Vec<AuditEvent>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT record FROM audit_events WHERE plan_id = ?1 ORDER BY timestamp, id",
            )
            .map_err(|err| map_db_error(&err))?;
        let rows = statement
            .query_map(params![plan_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(|err| map_db_error(&err))?;
        let mut events = Vec::new();
        for row in rows {
            let json = row.map_err(|err| map_db_error(&err))?;
            events.push(decode_record(&json)?);
        }
        Ok(events)
    }
}

// ============================================================================
// SECTION: User and RBAC Stores
// ============================================================================

impl UserStore for SqliteStore {
    fn get_user(&self, sub: &UserSub) -> Result<Option<User>, StoreError> {
        let connection = self.lock()?;
        let json: Option<String> = connection
            .query_row(
                "SELECT record FROM users WHERE sub = ?1",
                params![sub.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| map_db_error(&err))?;
        json.map(|json| decode_record(&json)).transpose().map_err(StoreError::from)
    }

    fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let json = encode_record(user)?;
        let connection = self.lock()?;
        connection
            .execute(
                "INSERT INTO users (sub, role_name, record) VALUES (?1, ?2, ?3)
                 ON CONFLICT(sub) DO UPDATE SET
                   role_name = excluded.role_name,
                   record = excluded.record",
                params![user.sub.as_str(), user.role_name.as_str(), json],
            )
            .map_err(|err| map_db_error(&err))?;
        Ok(())
    }
}

impl RbacStore for SqliteStore {
    fn role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT id, name, description FROM roles WHERE name = ?1",
                params![name.as_str()],
                |row| {
                    Ok(Role {
                        id: row.get(0)?,
                        name: RoleName::new(row.get::<_, String>(1)?),
                        description: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|err| map_db_error(&err).into())
    }

    fn permissions_for_role(&self, name: &RoleName) -> Result<Vec<Permission>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT p.id, p.resource_type, p.resource_id, p.action, p.description
                 FROM permissions p
                 JOIN role_permissions rp ON rp.permission_id = p.id
                 JOIN roles r ON r.id = rp.role_id
                 WHERE r.name = ?1
                 ORDER BY p.id",
            )
            .map_err(|err| map_db_error(&err))?;
        let rows = statement
            .query_map(params![name.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(|err| map_db_error(&err))?;
        let mut permissions = Vec::new();
        for row in rows {
            let (id, resource_type, resource_id, action, description) =
                row.map_err(|err| map_db_error(&err))?;
            let resource_type = decode_record(&format!("\"{resource_type}\""))?;
            let action = decode_record(&format!("\"{action}\""))?;
            permissions.push(Permission {
                id,
                resource_type,
                resource_id,
                action,
                description,
            });
        }
        Ok(permissions)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| map_db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| map_db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| map_db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| map_db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS devices (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    environment TEXT NOT NULL,
                    status TEXT NOT NULL,
                    record TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_device_environment_status
                    ON devices (environment, status);
                CREATE INDEX IF NOT EXISTS idx_device_name ON devices (name);
                CREATE TABLE IF NOT EXISTS credentials (
                    id TEXT PRIMARY KEY,
                    device_id TEXT NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    active INTEGER NOT NULL,
                    record TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_credential_device_kind
                    ON credentials (device_id, kind);
                CREATE UNIQUE INDEX IF NOT EXISTS idx_credential_active_unique
                    ON credentials (device_id, kind) WHERE active = 1;
                CREATE TABLE IF NOT EXISTS plans (
                    id TEXT PRIMARY KEY,
                    created_by TEXT NOT NULL,
                    status TEXT NOT NULL,
                    approval_token TEXT UNIQUE,
                    record TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_plan_created_by ON plans (created_by);
                CREATE INDEX IF NOT EXISTS idx_plan_status ON plans (status);
                CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    plan_id TEXT REFERENCES plans (id) ON DELETE CASCADE,
                    status TEXT NOT NULL,
                    progress_percent INTEGER NOT NULL DEFAULT 0
                        CHECK (progress_percent >= 0 AND progress_percent <= 100),
                    record TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_job_status ON jobs (status);
                CREATE TABLE IF NOT EXISTS snapshots (
                    id TEXT PRIMARY KEY,
                    device_id TEXT NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
                    timestamp INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    data BLOB NOT NULL,
                    meta TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_snapshot_device_timestamp
                    ON snapshots (device_id, timestamp);
                CREATE INDEX IF NOT EXISTS idx_snapshot_kind ON snapshots (kind);
                CREATE TABLE IF NOT EXISTS health_checks (
                    id TEXT PRIMARY KEY,
                    device_id TEXT NOT NULL REFERENCES devices (id) ON DELETE CASCADE,
                    timestamp INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    cpu_usage_percent REAL,
                    memory_used_bytes INTEGER,
                    memory_total_bytes INTEGER,
                    uptime_seconds INTEGER,
                    error_message TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_healthcheck_device_timestamp
                    ON health_checks (device_id, timestamp);
                CREATE INDEX IF NOT EXISTS idx_healthcheck_status ON health_checks (status);
                CREATE TABLE IF NOT EXISTS audit_events (
                    id TEXT PRIMARY KEY,
                    timestamp INTEGER NOT NULL,
                    plan_id TEXT,
                    device_id TEXT REFERENCES devices (id) ON DELETE SET NULL,
                    record TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_events (timestamp);
                CREATE INDEX IF NOT EXISTS idx_audit_plan ON audit_events (plan_id);
                CREATE TABLE IF NOT EXISTS roles (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_role_name ON roles (name);
                CREATE TABLE IF NOT EXISTS permissions (
                    id TEXT PRIMARY KEY,
                    resource_type TEXT NOT NULL,
                    resource_id TEXT NOT NULL,
                    action TEXT NOT NULL,
                    description TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_permission_resource_action
                    ON permissions (resource_type, resource_id, action);
                CREATE TABLE IF NOT EXISTS role_permissions (
                    role_id TEXT NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
                    permission_id TEXT NOT NULL REFERENCES permissions (id) ON DELETE CASCADE,
                    PRIMARY KEY (role_id, permission_id)
                );
                CREATE TABLE IF NOT EXISTS users (
                    sub TEXT PRIMARY KEY,
                    role_name TEXT NOT NULL REFERENCES roles (name) ON DELETE RESTRICT,
                    record TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_user_role ON users (role_name);",
            )
            .map_err(|err| map_db_error(&err))?;
            seed_default_roles(&tx)?;
        }
        Some(version) if version == SCHEMA_VERSION => {}
        Some(version) => {
            return Err(SqliteStoreError::Invalid(format!(
                "unsupported schema version {version} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit().map_err(|err| map_db_error(&err))
}

/// Seeds the default roles at schema creation.
fn seed_default_roles(tx: &rusqlite::Transaction<'_>) -> Result<(), SqliteStoreError> {
    for (name, description) in DEFAULT_ROLES {
        let mut bytes = [0_u8; 6];
        OsRng.fill_bytes(&mut bytes);
        let id = format!(
            "role-{}",
            bytes.iter().map(|byte| format!("{byte:02x}")).collect::<String>()
        );
        tx.execute(
            "INSERT OR IGNORE INTO roles (id, name, description) VALUES (?1, ?2, ?3)",
            params![id, name, description],
        )
        .map_err(|err| map_db_error(&err))?;
    }
    Ok(())
}
