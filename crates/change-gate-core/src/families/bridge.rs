// change-gate-core/src/families/bridge.rs
// ============================================================================
// Module: Bridge Family Engine
// Description: Validation, risk, preview, and mutations for bridge VLANs.
// Purpose: Implement the bridge write family on the shared engine seam.
// Dependencies: crate::core, crate::families, serde_json
// ============================================================================

//! ## Overview
//! Bridge VLAN entries steer tagged and untagged traffic across bridge ports.
//! A wrong entry can partition a segment, so removals are always high risk and
//! additions escalate in production.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::BridgeVlanAdd;
use crate::core::Device;
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
use crate::families::object_id;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// REST path of the bridge VLAN collection.
const VLAN_PATH: &str = "interface/bridge/vlan";

/// Largest legal VLAN identifier.
const MAX_VLAN_ID: u16 = 4094;

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Bridge family engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeEngine;

impl FamilyEngine for BridgeEngine {
    fn family(&self) -> ToolFamily {
        ToolFamily::Bridge
    }

    fn validate(&self, changes: &PlanChanges) -> Result<(), ValidationError> {
        match changes {
            PlanChanges::AddBridgeVlan(vlan) => validate_vlan(vlan),
            PlanChanges::RemoveBridgeVlan(remove) => {
                let mut errors = FieldErrors::new();
                if remove.vlan_entry_id.trim().is_empty() {
                    errors.push("vlan_entry_id", "vlan entry id must not be empty");
                }
                errors.finish()
            }
            other => Err(ValidationError::single(
                "operation",
                format!("'{}' is not a bridge operation", other.operation()),
            )),
        }
    }

    fn assess_risk(&self, changes: &PlanChanges, environment: Environment) -> RiskLevel {
        match changes {
            PlanChanges::AddBridgeVlan(_) if environment != Environment::Prod => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    fn preview(&self, device: &Device, changes: &PlanChanges) -> Result<PreviewDetail, EngineError> {
        let _ = device;
        match changes {
            PlanChanges::AddBridgeVlan(vlan) => Ok(PreviewDetail::AddBridgeVlan {
                bridge: vlan.bridge.clone(),
                vlan_ids: vlan.vlan_ids.clone(),
                estimated_impact: "Medium - tagged traffic is steered onto the listed ports"
                    .to_string(),
            }),
            PlanChanges::RemoveBridgeVlan(remove) => Ok(PreviewDetail::RemoveBridgeVlan {
                vlan_entry_id: remove.vlan_entry_id.clone(),
                estimated_impact: "High - removing the entry may partition the VLAN".to_string(),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Bridge,
                operation: other.operation(),
            }),
        }
    }

    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::BridgeVlans
    }

    fn resource_path(&self) -> &'static str {
        VLAN_PATH
    }

    fn build_mutation(&self, changes: &PlanChanges) -> Result<Mutation, EngineError> {
        match changes {
            PlanChanges::AddBridgeVlan(vlan) => {
                let vlan_ids =
                    vlan.vlan_ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
                let mut body = Map::new();
                body.insert("bridge".to_string(), json!(vlan.bridge));
                body.insert("vlan-ids".to_string(), json!(vlan_ids));
                if !vlan.tagged_ports.is_empty() {
                    body.insert("tagged".to_string(), json!(vlan.tagged_ports.join(",")));
                }
                if !vlan.untagged_ports.is_empty() {
                    body.insert("untagged".to_string(), json!(vlan.untagged_ports.join(",")));
                }
                Ok(Mutation::Post {
                    path: VLAN_PATH.to_string(),
                    body: Value::Object(body),
                })
            }
            PlanChanges::RemoveBridgeVlan(remove) => Ok(Mutation::Delete {
                path: format!("{VLAN_PATH}/{}", remove.vlan_entry_id),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Bridge,
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
            PlanChanges::AddBridgeVlan(_) => {
                let created = outcome.created_id.as_deref().ok_or_else(|| {
                    EngineError::RollbackUnderivable(
                        "no created vlan entry id was captured".to_string(),
                    )
                })?;
                Ok(vec![Mutation::Delete {
                    path: format!("{VLAN_PATH}/{created}"),
                }])
            }
            PlanChanges::RemoveBridgeVlan(remove) => {
                let prior =
                    find_by_id(snapshot_objects, &remove.vlan_entry_id).ok_or_else(|| {
                        EngineError::RollbackUnderivable(format!(
                            "vlan entry '{}' is missing from the snapshot",
                            remove.vlan_entry_id
                        ))
                    })?;
                let mut body = prior.clone();
                if let Some(map) = body.as_object_mut() {
                    map.remove(ID_FIELD);
                }
                Ok(vec![Mutation::Post {
                    path: VLAN_PATH.to_string(),
                    body,
                }])
            }
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Bridge,
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
        let Some(entries) = collection.as_array() else {
            return false;
        };
        match changes {
            PlanChanges::AddBridgeVlan(_) => match outcome.created_id.as_deref() {
                Some(created) => {
                    entries.iter().any(|entry| object_id(entry).as_deref() == Some(created))
                }
                None => false,
            },
            PlanChanges::RemoveBridgeVlan(_) => entries.len() + 1 == snapshot_objects.len(),
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates the parameters of a bridge VLAN addition.
///
/// # Errors
///
/// Returns [`ValidationError`] with one entry per invalid field.
pub fn validate_vlan(vlan: &BridgeVlanAdd) -> Result<(), ValidationError> {
    let mut errors = FieldErrors::new();
    if vlan.bridge.trim().is_empty() {
        errors.push("bridge", "bridge name must not be empty");
    }
    if vlan.vlan_ids.is_empty() {
        errors.push("vlan_ids", "at least one vlan id must be provided");
    }
    for vlan_id in &vlan.vlan_ids {
        if !(1..=MAX_VLAN_ID).contains(vlan_id) {
            errors.push("vlan_ids", format!("vlan id {vlan_id} outside 1-{MAX_VLAN_ID}"));
        }
    }
    errors.finish()
}
