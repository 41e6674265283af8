// change-gate-transport/src/registry.rs
// ============================================================================
// Module: Transport Registry
// Description: Credential-kind keyed registry of transport factories.
// Purpose: Let hosts plug in transports without touching the core.
// Dependencies: change-gate-core, async-trait
// ============================================================================

//! ## Overview
//! The registry dispatches connections on the credential kind: `rest` is
//! registered by default; `ssh` and `routeros_ssh_key` factories are supplied
//! by the host. Unregistered kinds fail closed at connect time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use change_gate_core::Credential;
use change_gate_core::CredentialKind;
use change_gate_core::Device;
use change_gate_core::DeviceTransport;
use change_gate_core::SecretMaterial;
use change_gate_core::TransportError;
use change_gate_core::TransportFactory;

use crate::rest::RestTransportFactory;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Credential-kind keyed transport factory registry.
pub struct TransportRegistry {
    /// Registered factories by credential kind.
    factories: BTreeMap<CredentialKind, Arc<dyn TransportFactory>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Creates a registry with the REST factory registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            CredentialKind::Rest,
            Arc::new(RestTransportFactory::default()),
        );
        registry
    }

    /// Registers a factory for a credential kind, replacing any existing one.
    pub fn register(&mut self, kind: CredentialKind, factory: Arc<dyn TransportFactory>) {
        self.factories.insert(kind, factory);
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl TransportFactory for TransportRegistry {
    async fn connect(
        &self,
        device: &Device,
        credential: &Credential,
        secret: &SecretMaterial,
        timeout_seconds: u64,
    ) -> Result<Box<dyn DeviceTransport>, TransportError> {
        let factory = self.factories.get(&credential.kind).ok_or_else(|| {
            TransportError::Connect(format!(
                "no transport registered for credential kind '{}'",
                credential.kind
            ))
        })?;
        factory.connect(device, credential, secret, timeout_seconds).await
    }
}
