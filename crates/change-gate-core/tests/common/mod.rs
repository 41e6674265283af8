// change-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Test Harness
// Description: Shared fixtures for plan/apply integration tests.
// ============================================================================
//! ## Overview
//! Builds a complete in-memory deployment: stores, clock, recorder, simulated
//! devices, plan service, authorization gate, and apply executor.

#![allow(
    dead_code,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only fixtures are permitted panics and partial use."
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use change_gate_core::ApplyExecutor;
use change_gate_core::ApplyExecutorParts;
use change_gate_core::ApplySettings;
use change_gate_core::AuditRecorder;
use change_gate_core::AuthorizationGate;
use change_gate_core::AuthzContext;
use change_gate_core::CapabilityFlags;
use change_gate_core::Credential;
use change_gate_core::CredentialId;
use change_gate_core::CredentialKind;
use change_gate_core::Device;
use change_gate_core::DeviceId;
use change_gate_core::DeviceStatus;
use change_gate_core::Environment;
use change_gate_core::FirewallAddRule;
use change_gate_core::ManualClock;
use change_gate_core::MemoryStore;
use change_gate_core::NoopFallbackSink;
use change_gate_core::PassthroughCipher;
use change_gate_core::Permission;
use change_gate_core::PermissionAction;
use change_gate_core::PlanChanges;
use change_gate_core::PlanRequest;
use change_gate_core::PlanService;
use change_gate_core::PlanSettings;
use change_gate_core::RESOURCE_WILDCARD;
use change_gate_core::ResourceType;
use change_gate_core::RoleName;
use change_gate_core::SimulatedDevice;
use change_gate_core::SimulatedTransportFactory;
use change_gate_core::Timestamp;
use change_gate_core::ToolName;
use change_gate_core::User;
use change_gate_core::UserSub;
use change_gate_core::core::rbac::Role;
use change_gate_core::interfaces::CredentialStore;
use change_gate_core::interfaces::DeviceStore;
use change_gate_core::interfaces::UserStore;
use serde_json::json;

/// Instant the harness clock starts at.
pub const T0_MILLIS: i64 = 1_767_225_600_000;

/// Fully wired in-memory deployment for integration tests.
pub struct Harness {
    /// Shared in-memory store backing every seam.
    pub store: MemoryStore,
    /// Manually advanced clock.
    pub clock: Arc<ManualClock>,
    /// Simulated transport factory.
    pub transports: Arc<SimulatedTransportFactory>,
    /// Plan service under test.
    pub plans: Arc<PlanService>,
    /// Authorization gate under test.
    pub gate: AuthorizationGate,
    /// Apply executor under test.
    pub executor: ApplyExecutor,
}

impl Harness {
    /// Builds the deployment with default plan/apply settings.
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::at(Timestamp::from_unix_millis(T0_MILLIS)));
        let recorder = Arc::new(AuditRecorder::new(
            Arc::new(store.clone()),
            clock.clone(),
            Arc::new(NoopFallbackSink),
        ));
        let transports = Arc::new(SimulatedTransportFactory::new());
        let plans = Arc::new(PlanService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            recorder.clone(),
            PlanSettings::default(),
        ));
        let gate = AuthorizationGate::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            recorder.clone(),
        );
        let executor = ApplyExecutor::new(ApplyExecutorParts {
            devices: Arc::new(store.clone()),
            credentials: Arc::new(store.clone()),
            plans: Arc::new(store.clone()),
            jobs: Arc::new(store.clone()),
            snapshots: Arc::new(store.clone()),
            health: Arc::new(store.clone()),
            transports: transports.clone(),
            cipher: Arc::new(PassthroughCipher),
            clock: clock.clone(),
            recorder,
            plan_service: plans.clone(),
            settings: ApplySettings::default(),
        });
        let harness = Self {
            store,
            clock,
            transports,
            plans,
            gate,
            executor,
        };
        harness.seed_rbac();
        harness
    }

    /// Seeds the admin role, wildcard permissions, and the default operator.
    fn seed_rbac(&self) {
        self.store
            .seed_role(
                Role {
                    id: "role-admin".to_string(),
                    name: RoleName::new("admin"),
                    description: "Full access".to_string(),
                },
                vec![
                    Permission {
                        id: "perm-device-write".to_string(),
                        resource_type: ResourceType::Device,
                        resource_id: RESOURCE_WILDCARD.to_string(),
                        action: PermissionAction::Write,
                        description: None,
                    },
                    Permission {
                        id: "perm-device-execute".to_string(),
                        resource_type: ResourceType::Device,
                        resource_id: RESOURCE_WILDCARD.to_string(),
                        action: PermissionAction::Execute,
                        description: None,
                    },
                ],
            )
            .expect("seed admin role");
        self.store
            .upsert_user(&User {
                sub: UserSub::new("operator"),
                email: Some("operator@example.net".to_string()),
                display_name: Some("Operator".to_string()),
                role_name: RoleName::new("admin"),
                device_scopes: Vec::new(),
                is_active: true,
                last_login_at: None,
            })
            .expect("seed operator");
    }

    /// Registers a device record, its credential, and a simulated peer with
    /// one pre-existing forward rule.
    pub fn seed_device(&self, device_id: &str, environment: Environment) -> Arc<SimulatedDevice> {
        self.seed_device_with_caps(device_id, environment, CapabilityFlags {
            allow_advanced_writes: true,
            allow_professional_workflows: true,
            allow_firewall_writes: true,
            allow_routing_writes: true,
            allow_wireless_writes: true,
            allow_dhcp_writes: true,
            allow_bridge_writes: true,
        })
    }

    /// Registers a device with explicit capability flags.
    pub fn seed_device_with_caps(
        &self,
        device_id: &str,
        environment: Environment,
        capabilities: CapabilityFlags,
    ) -> Arc<SimulatedDevice> {
        let id = DeviceId::new(device_id);
        self.store
            .upsert_device(&Device {
                id: id.clone(),
                name: format!("router-{device_id}"),
                management_address: format!("{device_id}.example.net"),
                environment,
                status: DeviceStatus::Healthy,
                tags: BTreeSet::new(),
                capabilities,
                os_version: Some("7.16".to_string()),
                system_identity: None,
                hardware_model: None,
                serial_number: None,
                last_seen_at: None,
            })
            .expect("seed device");
        self.store
            .upsert_credential(&Credential {
                id: CredentialId::new(format!("cred-{device_id}")),
                device_id: id.clone(),
                kind: CredentialKind::Rest,
                username: "svc-change-gate".to_string(),
                encrypted_secret: "enc:hunter2".to_string(),
                private_key: None,
                public_key_fingerprint: None,
                active: true,
                rotated_at: None,
            })
            .expect("seed credential");
        let simulated = SimulatedDevice::with_objects(vec![json!({
            ".id": "*1",
            "chain": "forward",
            "action": "accept",
            "comment": "baseline",
        })]);
        self.transports.register(id, simulated.clone());
        simulated
    }

    /// Authorizes the operator for a tool against the given devices.
    pub fn authorize(&self, tool: &str, device_ids: &[&str]) -> AuthzContext {
        let ids: Vec<DeviceId> = device_ids.iter().map(|id| DeviceId::new(*id)).collect();
        self.gate
            .authorize(&UserSub::new("operator"), &ToolName::new(tool), &ids)
            .expect("operator is authorized")
    }
}

/// Builds the canonical add-rule change used across scenarios.
pub fn forward_allow_rule() -> PlanChanges {
    PlanChanges::AddFirewallRule(FirewallAddRule {
        chain: "forward".to_string(),
        action: "accept".to_string(),
        src_address: Some("192.168.1.0/24".to_string()),
        dst_address: None,
        protocol: Some("tcp".to_string()),
        dst_port: Some("443".to_string()),
        comment: Some("allow https".to_string()),
    })
}

/// Builds a plan request targeting the given devices.
pub fn plan_request(device_ids: &[&str], changes: PlanChanges) -> PlanRequest {
    PlanRequest {
        device_ids: device_ids.iter().map(|id| DeviceId::new(*id)).collect(),
        summary: "integration test change".to_string(),
        changes,
        batch_size: 0,
        pause_seconds_between_batches: 0,
        rollback_on_failure: true,
    }
}
