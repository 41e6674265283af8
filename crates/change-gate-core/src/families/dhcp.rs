// change-gate-core/src/families/dhcp.rs
// ============================================================================
// Module: DHCP Family Engine
// Description: Validation, risk, preview, and mutations for lease reservations.
// Purpose: Implement the DHCP write family on the shared engine seam.
// Dependencies: crate::core, crate::families, serde_json
// ============================================================================

//! ## Overview
//! DHCP lease reservations pin an address to a client MAC. Additions are
//! routine outside production; removals free an address a client may still be
//! using and are always high risk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::Device;
use crate::core::DhcpLeaseAdd;
use crate::core::Environment;
use crate::core::PlanChanges;
use crate::core::PreviewDetail;
use crate::core::RiskLevel;
use crate::core::SnapshotKind;
use crate::core::ToolFamily;
use crate::families::EngineError;
use crate::families::FamilyEngine;
use crate::families::FieldErrors;
use crate::families::ID_FIELD;
use crate::families::Mutation;
use crate::families::MutationOutcome;
use crate::families::ValidationError;
use crate::families::find_by_id;
use crate::families::is_valid_address;
use crate::families::is_valid_mac;
use crate::families::object_id;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// REST path of the DHCP lease collection.
const LEASE_PATH: &str = "ip/dhcp-server/lease";

// ============================================================================
// SECTION: Engine
// ============================================================================

/// DHCP family engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DhcpEngine;

impl FamilyEngine for DhcpEngine {
    fn family(&self) -> ToolFamily {
        ToolFamily::Dhcp
    }

    fn validate(&self, changes: &PlanChanges) -> Result<(), ValidationError> {
        match changes {
            PlanChanges::AddDhcpLease(lease) => validate_lease(lease),
            PlanChanges::RemoveDhcpLease(remove) => {
                let mut errors = FieldErrors::new();
                if remove.lease_id.trim().is_empty() {
                    errors.push("lease_id", "lease id must not be empty");
                }
                errors.finish()
            }
            other => Err(ValidationError::single(
                "operation",
                format!("'{}' is not a dhcp operation", other.operation()),
            )),
        }
    }

    fn assess_risk(&self, changes: &PlanChanges, environment: Environment) -> RiskLevel {
        match changes {
            PlanChanges::AddDhcpLease(_) if environment != Environment::Prod => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    fn preview(&self, device: &Device, changes: &PlanChanges) -> Result<PreviewDetail, EngineError> {
        let _ = device;
        match changes {
            PlanChanges::AddDhcpLease(lease) => Ok(PreviewDetail::AddDhcpLease {
                address: lease.address.clone(),
                mac_address: lease.mac_address.clone(),
                estimated_impact: "Low - reservation takes effect at the client's next renewal"
                    .to_string(),
            }),
            PlanChanges::RemoveDhcpLease(remove) => Ok(PreviewDetail::RemoveDhcpLease {
                lease_id: remove.lease_id.clone(),
                estimated_impact: "Medium - the reserved address may be reassigned".to_string(),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Dhcp,
                operation: other.operation(),
            }),
        }
    }

    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::DhcpLeases
    }

    fn resource_path(&self) -> &'static str {
        LEASE_PATH
    }

    fn build_mutation(&self, changes: &PlanChanges) -> Result<Mutation, EngineError> {
        match changes {
            PlanChanges::AddDhcpLease(lease) => {
                let mut body = Map::new();
                body.insert("address".to_string(), json!(lease.address));
                body.insert("mac-address".to_string(), json!(lease.mac_address));
                if let Some(server) = &lease.server {
                    body.insert("server".to_string(), json!(server));
                }
                if let Some(comment) = &lease.comment {
                    body.insert("comment".to_string(), json!(comment));
                }
                Ok(Mutation::Post {
                    path: LEASE_PATH.to_string(),
                    body: Value::Object(body),
                })
            }
            PlanChanges::RemoveDhcpLease(remove) => Ok(Mutation::Delete {
                path: format!("{LEASE_PATH}/{}", remove.lease_id),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Dhcp,
                operation: other.operation(),
            }),
        }
    }

    fn build_rollback(
        &self,
        changes: &PlanChanges,
        snapshot_objects: &[Value],
        outcome: &MutationOutcome,
    ) -> Result<Vec<Mutation>, EngineError> {
        match changes {
            PlanChanges::AddDhcpLease(_) => {
                let created = outcome.created_id.as_deref().ok_or_else(|| {
                    EngineError::RollbackUnderivable("no created lease id was captured".to_string())
                })?;
                Ok(vec![Mutation::Delete {
                    path: format!("{LEASE_PATH}/{created}"),
                }])
            }
            PlanChanges::RemoveDhcpLease(remove) => {
                let prior = find_by_id(snapshot_objects, &remove.lease_id).ok_or_else(|| {
                    EngineError::RollbackUnderivable(format!(
                        "lease '{}' is missing from the snapshot",
                        remove.lease_id
                    ))
                })?;
                let mut body = prior.clone();
                if let Some(map) = body.as_object_mut() {
                    map.remove(ID_FIELD);
                }
                Ok(vec![Mutation::Post {
                    path: LEASE_PATH.to_string(),
                    body,
                }])
            }
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Dhcp,
                operation: other.operation(),
            }),
        }
    }

    fn verify_collection(
        &self,
        collection: &Value,
        snapshot_objects: &[Value],
        outcome: &MutationOutcome,
        changes: &PlanChanges,
    ) -> bool {
        let Some(leases) = collection.as_array() else {
            return false;
        };
        match changes {
            PlanChanges::AddDhcpLease(_) => match outcome.created_id.as_deref() {
                Some(created) => {
                    leases.iter().any(|lease| object_id(lease).as_deref() == Some(created))
                }
                None => false,
            },
            PlanChanges::RemoveDhcpLease(_) => leases.len() + 1 == snapshot_objects.len(),
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates the parameters of a lease addition.
///
/// # Errors
///
/// Returns [`ValidationError`] with one entry per invalid field.
pub fn validate_lease(lease: &DhcpLeaseAdd) -> Result<(), ValidationError> {
    let mut errors = FieldErrors::new();
    if !is_valid_address(&lease.address) || lease.address.contains('/') {
        errors.push("address", format!("invalid lease address '{}'", lease.address));
    }
    if !is_valid_mac(&lease.mac_address) {
        errors.push("mac_address", format!("invalid mac address '{}'", lease.mac_address));
    }
    errors.finish()
}
