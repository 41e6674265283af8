// change-gate-core/src/runtime/transport.rs
// ============================================================================
// Module: Change Gate Simulated Transport
// Description: Scriptable in-memory device transport for tests and demos.
// Purpose: Exercise the apply protocol without network access.
// Dependencies: crate::core, crate::interfaces, async-trait, serde_json
// ============================================================================

//! ## Overview
//! The simulated transport models a device's REST API in memory: one object
//! collection, a `system/resource` endpoint, and scriptable failures
//! (unreachable device, missing system resource, failing mutations). The
//! apply executor cannot tell it apart from a real transport, which is the
//! point.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

use crate::core::Credential;
use crate::core::Device;
use crate::core::DeviceId;
use crate::core::SecretMaterial;
use crate::interfaces::DeviceTransport;
use crate::interfaces::TransportError;
use crate::interfaces::TransportFactory;

// ============================================================================
// SECTION: Simulated Device
// ============================================================================

/// Scriptable in-memory device state shared across transports.
#[derive(Debug, Default)]
pub struct SimulatedDevice {
    /// Objects in the device's single resource collection.
    objects: Mutex<Vec<Value>>,
    /// Response served for `system/resource`; `Null` simulates a dead API.
    system_resource: Mutex<Value>,
    /// When set, connections are refused.
    unreachable: AtomicBool,
    /// When set, mutations fail with a 500 status.
    fail_mutations: AtomicBool,
    /// Monotonic source of device-assigned object ids.
    next_id: AtomicU64,
}

impl SimulatedDevice {
    /// Creates a healthy device with the given initial objects.
    ///
    /// Device-assigned ids for new objects start above the seeded count so
    /// they never collide with seeded `.id` values.
    #[must_use]
    pub fn with_objects(objects: Vec<Value>) -> Arc<Self> {
        let next_id = u64::try_from(objects.len()).unwrap_or(0) + 1;
        let device = Self {
            objects: Mutex::new(objects),
            system_resource: Mutex::new(json!({
                "uptime": "2w3d4h",
                "cpu-load": "7",
                "free-memory": 180_000_000_u64,
                "total-memory": 256_000_000_u64,
            })),
            unreachable: AtomicBool::new(false),
            fail_mutations: AtomicBool::new(false),
            next_id: AtomicU64::new(next_id),
        };
        Arc::new(device)
    }

    /// Marks the device unreachable for future connections.
    pub fn set_unreachable(&self) {
        self.unreachable.store(true, Ordering::Relaxed);
    }

    /// Makes future mutations fail with a 500 status.
    pub fn set_fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::Relaxed);
    }

    /// Replaces the `system/resource` response; `Null` fails health checks.
    pub fn set_system_resource(&self, value: Value) {
        if let Ok(mut resource) = self.system_resource.lock() {
            *resource = value;
        }
    }

    /// Returns a copy of the current collection.
    #[must_use]
    pub fn objects(&self) -> Vec<Value> {
        self.objects.lock().map(|objects| objects.clone()).unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Simulated Transport
// ============================================================================

/// Transport bound to one simulated device.
#[derive(Debug)]
pub struct SimulatedTransport {
    /// Shared device state.
    device: Arc<SimulatedDevice>,
    /// Whether the transport was closed.
    closed: bool,
}

impl SimulatedTransport {
    /// Fails closed when the transport was already closed.
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Fails mutations when the device is scripted to reject them.
    fn ensure_mutable(&self) -> Result<(), TransportError> {
        if self.device.fail_mutations.load(Ordering::Relaxed) {
            Err(TransportError::Status {
                status: 500,
            })
        } else {
            Ok(())
        }
    }

    /// Extracts the object id from an object path such as `ip/route/*7`.
    fn path_id(path: &str) -> Result<&str, TransportError> {
        path.rsplit_once('/')
            .map(|(_, id)| id)
            .ok_or_else(|| TransportError::Protocol(format!("path '{path}' has no object id")))
    }
}

#[async_trait]
impl DeviceTransport for SimulatedTransport {
    async fn get(&mut self, path: &str) -> Result<Value, TransportError> {
        self.ensure_open()?;
        if path == "system/resource" {
            let resource = self
                .device
                .system_resource
                .lock()
                .map_err(|_| TransportError::Protocol("device state poisoned".to_string()))?;
            return Ok(resource.clone());
        }
        let objects = self
            .device
            .objects
            .lock()
            .map_err(|_| TransportError::Protocol("device state poisoned".to_string()))?;
        Ok(Value::Array(objects.clone()))
    }

    async fn post(&mut self, _path: &str, body: &Value) -> Result<Value, TransportError> {
        self.ensure_open()?;
        self.ensure_mutable()?;
        let id = self.device.next_id.fetch_add(1, Ordering::Relaxed);
        let mut object = body.clone();
        if let Some(map) = object.as_object_mut() {
            map.insert(".id".to_string(), json!(format!("*{id:X}")));
        }
        self.device
            .objects
            .lock()
            .map_err(|_| TransportError::Protocol("device state poisoned".to_string()))?
            .push(object.clone());
        Ok(object)
    }

    async fn patch(&mut self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.ensure_open()?;
        self.ensure_mutable()?;
        let id = Self::path_id(path)?;
        let mut objects = self
            .device
            .objects
            .lock()
            .map_err(|_| TransportError::Protocol("device state poisoned".to_string()))?;
        let target = objects
            .iter_mut()
            .find(|object| {
                object.get(".id").and_then(Value::as_str) == Some(id)
                    || object.get("name").and_then(Value::as_str) == Some(id)
            })
            .ok_or(TransportError::Status {
                status: 404,
            })?;
        if let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), body.as_object()) {
            for (key, value) in patch_map {
                target_map.insert(key.clone(), value.clone());
            }
        }
        Ok(target.clone())
    }

    async fn delete(&mut self, path: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.ensure_mutable()?;
        let id = Self::path_id(path)?;
        let mut objects = self
            .device
            .objects
            .lock()
            .map_err(|_| TransportError::Protocol("device state poisoned".to_string()))?;
        let before = objects.len();
        objects.retain(|object| object.get(".id").and_then(Value::as_str) != Some(id));
        if objects.len() == before {
            return Err(TransportError::Status {
                status: 404,
            });
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

// ============================================================================
// SECTION: Simulated Factory
// ============================================================================

/// Transport factory resolving simulated devices by id.
#[derive(Debug, Default)]
pub struct SimulatedTransportFactory {
    /// Simulated devices keyed by device id.
    devices: Mutex<BTreeMap<DeviceId, Arc<SimulatedDevice>>>,
}

impl SimulatedTransportFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a simulated device.
    pub fn register(&self, device_id: DeviceId, device: Arc<SimulatedDevice>) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(device_id, device);
        }
    }
}

#[async_trait]
impl TransportFactory for SimulatedTransportFactory {
    async fn connect(
        &self,
        device: &Device,
        _credential: &Credential,
        _secret: &SecretMaterial,
        _timeout_seconds: u64,
    ) -> Result<Box<dyn DeviceTransport>, TransportError> {
        let simulated = self
            .devices
            .lock()
            .map_err(|_| TransportError::Protocol("factory state poisoned".to_string()))?
            .get(&device.id)
            .cloned()
            .ok_or_else(|| {
                TransportError::Connect(format!("no simulated device '{}'", device.id))
            })?;
        if simulated.unreachable.load(Ordering::Relaxed) {
            return Err(TransportError::Connect(format!(
                "device '{}' is unreachable",
                device.id
            )));
        }
        Ok(Box::new(SimulatedTransport {
            device: simulated,
            closed: false,
        }))
    }
}
