// change-gate-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Round trips, constraints, and optimistic transitions.
// ============================================================================
//! ## Overview
//! Exercises the durable store against a temporary database: record round
//! trips, the active-credential and approval-token constraints, the
//! optimistic status transition, and role seeding.

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

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use change_gate_core::CapabilityFlags;
use change_gate_core::Credential;
use change_gate_core::CredentialId;
use change_gate_core::CredentialKind;
use change_gate_core::Device;
use change_gate_core::DeviceFilter;
use change_gate_core::DeviceId;
use change_gate_core::DeviceStatus;
use change_gate_core::Environment;
use change_gate_core::FirewallAddRule;
use change_gate_core::Job;
use change_gate_core::JobId;
use change_gate_core::JobStatus;
use change_gate_core::JobType;
use change_gate_core::Plan;
use change_gate_core::PlanChanges;
use change_gate_core::PlanId;
use change_gate_core::PlanStatus;
use change_gate_core::RiskLevel;
use change_gate_core::RoleName;
use change_gate_core::Snapshot;
use change_gate_core::SnapshotId;
use change_gate_core::SnapshotKind;
use change_gate_core::StoreError;
use change_gate_core::Timestamp;
use change_gate_core::ToolName;
use change_gate_core::User;
use change_gate_core::UserSub;
use change_gate_core::interfaces::CredentialStore;
use change_gate_core::interfaces::DeviceStore;
use change_gate_core::interfaces::JobStore;
use change_gate_core::interfaces::PlanStore;
use change_gate_core::interfaces::RbacStore;
use change_gate_core::interfaces::SnapshotStore;
use change_gate_core::interfaces::UserStore;
use change_gate_store_sqlite::SqliteStore;
use change_gate_store_sqlite::SqliteStoreConfig;
use serde_json::json;
use tempfile::TempDir;

/// Opens a store in a fresh temporary directory.
fn open_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().expect("tempdir");
    let config = SqliteStoreConfig::for_path(dir.path().join("change-gate.db"));
    let store = SqliteStore::new(&config).expect("store opens");
    (dir, store)
}

/// Builds a device record for round trips.
fn device(id: &str) -> Device {
    Device {
        id: DeviceId::new(id),
        name: format!("router-{id}"),
        management_address: format!("{id}.example.net"),
        environment: Environment::Lab,
        status: DeviceStatus::Healthy,
        tags: BTreeSet::from(["edge".to_string()]),
        capabilities: CapabilityFlags {
            allow_firewall_writes: true,
            ..CapabilityFlags::default()
        },
        os_version: Some("7.16".to_string()),
        system_identity: None,
        hardware_model: None,
        serial_number: None,
        last_seen_at: Some(Timestamp::from_unix_millis(1)),
    }
}

/// Builds a pending plan for round trips.
fn plan(id: &str, token: &str) -> Plan {
    Plan {
        id: PlanId::new(id),
        created_by: UserSub::new("operator"),
        tool_name: ToolName::new("plan_add_firewall_rule"),
        status: PlanStatus::Pending,
        device_ids: vec![DeviceId::new("dev-lab-01")],
        summary: "test".to_string(),
        changes: PlanChanges::AddFirewallRule(FirewallAddRule {
            chain: "forward".to_string(),
            action: "accept".to_string(),
            src_address: None,
            dst_address: None,
            protocol: None,
            dst_port: None,
            comment: None,
        }),
        risk_level: RiskLevel::Medium,
        approved_by: None,
        approved_at: None,
        approval_token: Some(token.to_string()),
        approval_token_timestamp: Some(Timestamp::from_unix_millis(0)),
        approval_expires_at: Some(Timestamp::from_unix_millis(900_000)),
        batch_size: 0,
        pause_seconds_between_batches: 0,
        rollback_on_failure: true,
        device_statuses: BTreeMap::new(),
        pre_check_results: BTreeMap::new(),
        created_at: Timestamp::from_unix_millis(0),
        updated_at: Timestamp::from_unix_millis(0),
    }
}

// ============================================================================
// SECTION: Devices and Credentials
// ============================================================================

/// Devices round trip exactly, including flags and tags.
#[test]
fn test_device_round_trip() {
    let (_dir, store) = open_store();
    let record = device("dev-lab-01");
    store.upsert_device(&record).expect("upsert");
    let loaded = store.get_device(&record.id).expect("read").expect("present");
    assert_eq!(loaded, record);

    let filtered = store
        .list_devices(&DeviceFilter {
            environment: Some(Environment::Lab),
            status: None,
            tag: Some("edge".to_string()),
        })
        .expect("list");
    assert_eq!(filtered.len(), 1);
}

/// Upserting a new active credential deactivates the previous one.
#[test]
fn test_single_active_credential_per_kind() {
    let (_dir, store) = open_store();
    store.upsert_device(&device("dev-lab-01")).expect("device");
    let first = Credential {
        id: CredentialId::new("cred-1"),
        device_id: DeviceId::new("dev-lab-01"),
        kind: CredentialKind::Rest,
        username: "svc-a".to_string(),
        encrypted_secret: "enc:a".to_string(),
        private_key: None,
        public_key_fingerprint: None,
        active: true,
        rotated_at: None,
    };
    store.upsert_credential(&first).expect("first credential");
    let mut second = first.clone();
    second.id = CredentialId::new("cred-2");
    second.username = "svc-b".to_string();
    store.upsert_credential(&second).expect("second credential");

    let active = store
        .active_credential(&DeviceId::new("dev-lab-01"), CredentialKind::Rest)
        .expect("read")
        .expect("one active");
    assert_eq!(active.id, CredentialId::new("cred-2"));
}

// ============================================================================
// SECTION: Plans
// ============================================================================

/// Plans round trip with their structured changes.
#[test]
fn test_plan_round_trip() {
    let (_dir, store) = open_store();
    let record = plan("plan-1", "approve-aaa");
    store.insert_plan(&record).expect("insert");
    let loaded = store.get_plan(&record.id).expect("read").expect("present");
    assert_eq!(loaded, record);
}

/// The approval token uniqueness constraint rejects reuse.
#[test]
fn test_approval_token_unique() {
    let (_dir, store) = open_store();
    store.insert_plan(&plan("plan-1", "approve-dup")).expect("first plan");
    let error = store.insert_plan(&plan("plan-2", "approve-dup")).expect_err("reuse rejected");
    assert!(matches!(error, StoreError::Conflict(_)));
}

/// The optimistic transition rejects stale pre-images.
#[test]
fn test_transition_pre_image_check() {
    let (_dir, store) = open_store();
    store.insert_plan(&plan("plan-1", "approve-aaa")).expect("insert");
    let approved = store
        .transition_plan_status(
            &PlanId::new("plan-1"),
            PlanStatus::Pending,
            PlanStatus::Approved,
            Some(&UserSub::new("approver")),
            Timestamp::from_unix_millis(5),
        )
        .expect("transition");
    assert_eq!(approved.status, PlanStatus::Approved);
    assert_eq!(approved.approved_by, Some(UserSub::new("approver")));

    let error = store
        .transition_plan_status(
            &PlanId::new("plan-1"),
            PlanStatus::Pending,
            PlanStatus::Executing,
            None,
            Timestamp::from_unix_millis(6),
        )
        .expect_err("stale pre-image rejected");
    assert!(matches!(error, StoreError::Conflict(_)));
}

// ============================================================================
// SECTION: Jobs
// ============================================================================

/// Jobs enforce the progress and attempts invariants at the store layer.
#[test]
fn test_job_constraints() {
    let (_dir, store) = open_store();
    let mut job = Job {
        id: JobId::new("job-1"),
        plan_id: None,
        job_type: JobType::ApplyPlan,
        status: JobStatus::Running,
        device_ids: vec![DeviceId::new("dev-lab-01")],
        attempts: 1,
        max_attempts: 3,
        next_run_at: None,
        progress_percent: 0,
        current_device_id: None,
        result_summary: None,
        error_message: None,
        created_at: Timestamp::from_unix_millis(0),
        updated_at: Timestamp::from_unix_millis(0),
    };
    store.insert_job(&job).expect("insert");

    job.progress_percent = 101;
    assert!(matches!(store.update_job(&job), Err(StoreError::Invalid(_))));

    job.progress_percent = 40;
    job.attempts = 4;
    assert!(matches!(store.update_job(&job), Err(StoreError::Invalid(_))));

    job.attempts = 3;
    store.update_job(&job).expect("valid update");
    let loaded = store.get_job(&job.id).expect("read").expect("present");
    assert_eq!(loaded.progress_percent, 40);
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Snapshot payload bytes and metadata survive the round trip.
#[test]
fn test_snapshot_round_trip() {
    let (_dir, store) = open_store();
    store.upsert_device(&device("dev-lab-01")).expect("device");
    let snapshot = Snapshot {
        id: SnapshotId::new("snap-1"),
        device_id: DeviceId::new("dev-lab-01"),
        timestamp: Timestamp::from_unix_millis(42),
        kind: SnapshotKind::FirewallFilterRules,
        data: serde_json::to_vec(&json!([{".id": "*1"}])).expect("payload"),
        meta: json!({"object_count": 1}),
    };
    store.insert_snapshot(&snapshot).expect("insert");
    let loaded = store.get_snapshot(&snapshot.id).expect("read").expect("present");
    assert_eq!(loaded, snapshot);
}

// ============================================================================
// SECTION: RBAC
// ============================================================================

/// Default roles are seeded at schema creation; users reference them.
#[test]
fn test_default_roles_and_users() {
    let (_dir, store) = open_store();
    for name in ["read_only", "ops_rw", "admin", "approver"] {
        assert!(
            store.role_by_name(&RoleName::new(name)).expect("read").is_some(),
            "missing seeded role {name}"
        );
    }

    let user = User {
        sub: UserSub::new("operator"),
        email: Some("operator@example.net".to_string()),
        display_name: None,
        role_name: RoleName::new("admin"),
        device_scopes: vec![DeviceId::new("dev-lab-01")],
        is_active: true,
        last_login_at: None,
    };
    store.upsert_user(&user).expect("user upsert");
    let loaded = store.get_user(&user.sub).expect("read").expect("present");
    assert_eq!(loaded, user);

    // A user referencing an unknown role violates the foreign key.
    let mut orphan = user;
    orphan.sub = UserSub::new("orphan");
    orphan.role_name = RoleName::new("no-such-role");
    assert!(matches!(store.upsert_user(&orphan), Err(StoreError::Conflict(_))));
}

/// Granted permissions expand through the association table.
#[test]
fn test_role_permission_expansion() {
    use change_gate_core::Permission;
    use change_gate_core::PermissionAction;
    use change_gate_core::RESOURCE_WILDCARD;
    use change_gate_core::ResourceType;
    use change_gate_core::core::rbac::Role;

    let (_dir, store) = open_store();
    let role = store
        .role_by_name(&RoleName::new("admin"))
        .expect("read")
        .expect("seeded");
    store
        .seed_role(
            &Role {
                id: role.id,
                name: role.name.clone(),
                description: role.description,
            },
            &[Permission {
                id: "perm-device-write".to_string(),
                resource_type: ResourceType::Device,
                resource_id: RESOURCE_WILDCARD.to_string(),
                action: PermissionAction::Write,
                description: Some("all devices".to_string()),
            }],
        )
        .expect("grant");

    let permissions = store.permissions_for_role(&role.name).expect("expand");
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].resource_id, RESOURCE_WILDCARD);
    assert_eq!(permissions[0].action, PermissionAction::Write);
}
