// change-gate-core/src/families/mod.rs
// ============================================================================
// Module: Change Gate Tool Families
// Description: Per-family validation, risk, preview, and mutation building.
// Purpose: Share one plan/apply skeleton across firewall, routing, wireless,
// dhcp, and bridge tool families.
// Dependencies: crate::core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each write tool family implements [`FamilyEngine`]: it validates change
//! payloads, classifies risk, renders previews, and translates changes into
//! device mutations with their snapshot-based inverses. The plan service and
//! apply executor are generic over the engine, so no family duplicates the
//! workflow.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod bridge;
pub mod dhcp;
pub mod firewall;
pub mod routing;
pub mod wireless;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;

use serde_json::Value;
use thiserror::Error;

use crate::core::Device;
use crate::core::Environment;
use crate::core::PlanChanges;
use crate::core::PreviewDetail;
use crate::core::RiskLevel;
use crate::core::SnapshotKind;
use crate::core::ToolFamily;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Field carrying the device-assigned object identifier in REST payloads.
pub const ID_FIELD: &str = ".id";

// ============================================================================
// SECTION: Validation Errors
// ============================================================================

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field the failure concerns.
    pub field: String,
    /// Human-readable failure description.
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation failure carrying every field-level detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field-level failures, in evaluation order.
    pub errors: Vec<FieldError>,
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Builds a validation error from collected field failures.
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self {
            errors,
        }
    }

    /// Builds a single-field validation error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter validation failed")?;
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

/// Collector used by validators to gather field failures before failing.
#[derive(Debug, Default)]
pub struct FieldErrors {
    /// Accumulated failures.
    errors: Vec<FieldError>,
}

impl FieldErrors {
    /// Creates an empty collector.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            errors: Vec::new(),
        }
    }

    /// Records a field failure.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Finishes collection, failing when any error was recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when at least one failure was recorded.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.errors))
        }
    }
}

// ============================================================================
// SECTION: Engine Errors
// ============================================================================

/// Errors raised by family engines outside validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The change payload does not belong to this family.
    #[error("operation '{operation}' is not handled by the {family} engine")]
    UnsupportedOperation {
        /// Engine family.
        family: ToolFamily,
        /// Offending operation label.
        operation: &'static str,
    },
    /// A rollback inverse could not be derived from the snapshot.
    #[error("rollback could not be derived: {0}")]
    RollbackUnderivable(String),
}

// ============================================================================
// SECTION: Mutations
// ============================================================================

/// A single device mutation issued over a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create an object under the given path.
    Post {
        /// Resource path.
        path: String,
        /// Object body.
        body: Value,
    },
    /// Patch an object in place.
    Patch {
        /// Object path including the device-assigned id.
        path: String,
        /// Fields to replace.
        body: Value,
    },
    /// Delete an object.
    Delete {
        /// Object path including the device-assigned id.
        path: String,
    },
}

/// Outcome of the planned mutation, consumed when deriving rollbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Device-assigned id of a newly created object.
    pub created_id: Option<String>,
}

// ============================================================================
// SECTION: Family Engine
// ============================================================================

/// Per-family planning and apply behavior.
///
/// # Invariants
/// - `validate` accepts exactly the operations belonging to the family.
/// - `build_rollback` derives the inverse purely from the snapshot and the
///   mutation outcome; it never consults live device state.
pub trait FamilyEngine: Send + Sync {
    /// Returns the family this engine owns.
    fn family(&self) -> ToolFamily;

    /// Validates a change payload.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] with field-level details on failure.
    fn validate(&self, changes: &PlanChanges) -> Result<(), ValidationError>;

    /// Classifies the risk of the change in the given environment.
    fn assess_risk(&self, changes: &PlanChanges, environment: Environment) -> RiskLevel;

    /// Renders the per-device preview payload.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedOperation`] for foreign payloads.
    fn preview(&self, device: &Device, changes: &PlanChanges) -> Result<PreviewDetail, EngineError>;

    /// Returns the snapshot kind captured before mutating.
    fn snapshot_kind(&self) -> SnapshotKind;

    /// Returns the REST resource path of the mutated collection.
    fn resource_path(&self) -> &'static str;

    /// Translates the change payload into the device mutation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedOperation`] for foreign payloads.
    fn build_mutation(&self, changes: &PlanChanges) -> Result<Mutation, EngineError>;

    /// Derives the inverse mutations that restore the snapshot state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the payload is foreign or the snapshot
    /// lacks the object needed for restoration.
    fn build_rollback(
        &self,
        changes: &PlanChanges,
        snapshot_objects: &[Value],
        outcome: &MutationOutcome,
    ) -> Result<Vec<Mutation>, EngineError>;

    /// Verifies the post-mutation collection against the snapshot.
    ///
    /// The default check requires the collection to be a JSON array; families
    /// refine this with operation-aware cardinality checks.
    fn verify_collection(
        &self,
        collection: &Value,
        snapshot_objects: &[Value],
        outcome: &MutationOutcome,
        changes: &PlanChanges,
    ) -> bool {
        let _ = (snapshot_objects, outcome, changes);
        collection.is_array()
    }
}

/// Resolves the engine owning the change payload's family.
#[must_use]
pub fn engine_for(family: ToolFamily) -> &'static dyn FamilyEngine {
    match family {
        ToolFamily::Firewall => &firewall::FirewallEngine,
        ToolFamily::Routing => &routing::RoutingEngine,
        ToolFamily::Wireless => &wireless::WirelessEngine,
        ToolFamily::Dhcp => &dhcp::DhcpEngine,
        ToolFamily::Bridge => &bridge::BridgeEngine,
    }
}

// ============================================================================
// SECTION: Shared Validation Helpers
// ============================================================================

/// Validates a port number or `a-b` port range.
///
/// Surrounding whitespace and whitespace around the dash are tolerated;
/// empty segments are invalid; bounds are `1..=65535` with `a <= b`.
#[must_use]
pub fn is_valid_port(port: &str) -> bool {
    let port = port.trim();
    if let Some((start, end)) = port.split_once('-') {
        let (Some(start), Some(end)) = (parse_port(start), parse_port(end)) else {
            return false;
        };
        start <= end
    } else {
        parse_port(port).is_some()
    }
}

/// Parses a single port segment in `1..=65535`.
fn parse_port(segment: &str) -> Option<u16> {
    let segment = segment.trim();
    if segment.is_empty() {
        return None;
    }
    match segment.parse::<u16>() {
        Ok(port) if port >= 1 => Some(port),
        _ => None,
    }
}

/// Validates an IP address or CIDR prefix (v4 or v6).
///
/// Host bits need not be zero; `10.0.0.1/24` is accepted.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() {
        return false;
    }
    match address.split_once('/') {
        Some((host, prefix)) => {
            let Ok(host) = host.parse::<IpAddr>() else {
                return false;
            };
            let Ok(prefix) = prefix.parse::<u8>() else {
                return false;
            };
            let max_prefix: u8 = if host.is_ipv4() { 32 } else { 128 };
            prefix <= max_prefix
        }
        None => address.parse::<IpAddr>().is_ok(),
    }
}

/// Validates a colon-separated MAC address such as `AA:BB:CC:DD:EE:FF`.
#[must_use]
pub fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Extracts the device-assigned id from a created or listed object.
#[must_use]
pub fn object_id(object: &Value) -> Option<String> {
    object.get(ID_FIELD).and_then(Value::as_str).map(ToString::to_string)
}

/// Finds a snapshot object by device-assigned id.
#[must_use]
pub fn find_by_id<'a>(objects: &'a [Value], id: &str) -> Option<&'a Value> {
    objects.iter().find(|object| object_id(object).as_deref() == Some(id))
}
