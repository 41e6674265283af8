// change-gate-core/src/families/wireless.rs
// ============================================================================
// Module: Wireless Family Engine
// Description: Validation, risk, preview, and mutations for wireless config.
// Purpose: Implement the wireless write family on the shared engine seam.
// Dependencies: crate::core, crate::families, serde_json
// ============================================================================

//! ## Overview
//! Wireless updates reconfigure an existing interface in place, so every
//! operation in this family is high risk: a bad SSID or frequency change can
//! drop every associated client. Rollback restores the prior values of the
//! touched fields from the snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::Device;
use crate::core::Environment;
use crate::core::PlanChanges;
use crate::core::PreviewDetail;
use crate::core::RiskLevel;
use crate::core::SnapshotKind;
use crate::core::ToolFamily;
use crate::core::WirelessSettings;
use crate::families::EngineError;
use crate::families::FamilyEngine;
use crate::families::FieldErrors;
use crate::families::Mutation;
use crate::families::MutationOutcome;
use crate::families::ValidationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// REST path of the wireless interface collection.
const WIRELESS_PATH: &str = "interface/wireless";

/// Maximum SSID length in bytes.
const MAX_SSID_BYTES: usize = 32;

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Wireless family engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct WirelessEngine;

impl FamilyEngine for WirelessEngine {
    fn family(&self) -> ToolFamily {
        ToolFamily::Wireless
    }

    fn validate(&self, changes: &PlanChanges) -> Result<(), ValidationError> {
        match changes {
            PlanChanges::SetWirelessInterface(update) => {
                let mut errors = FieldErrors::new();
                if update.interface.trim().is_empty() {
                    errors.push("interface", "interface name must not be empty");
                }
                if update.settings.is_empty() {
                    errors.push("settings", "At least one setting must be provided");
                }
                if let Some(ssid) = &update.settings.ssid
                    && (ssid.is_empty() || ssid.len() > MAX_SSID_BYTES)
                {
                    errors.push("settings.ssid", format!("ssid must be 1-{MAX_SSID_BYTES} bytes"));
                }
                errors.finish()
            }
            other => Err(ValidationError::single(
                "operation",
                format!("'{}' is not a wireless operation", other.operation()),
            )),
        }
    }

    fn assess_risk(&self, changes: &PlanChanges, environment: Environment) -> RiskLevel {
        let _ = (changes, environment);
        // Reconfiguring a live radio always risks dropping associated clients.
        RiskLevel::High
    }

    fn preview(&self, device: &Device, changes: &PlanChanges) -> Result<PreviewDetail, EngineError> {
        let _ = device;
        match changes {
            PlanChanges::SetWirelessInterface(update) => Ok(PreviewDetail::SetWirelessInterface {
                interface: update.interface.clone(),
                settings: update.settings.clone(),
                estimated_impact:
                    "High - associated clients may disconnect while the interface reconfigures"
                        .to_string(),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Wireless,
                operation: other.operation(),
            }),
        }
    }

    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::WirelessInterfaces
    }

    fn resource_path(&self) -> &'static str {
        WIRELESS_PATH
    }

    fn build_mutation(&self, changes: &PlanChanges) -> Result<Mutation, EngineError> {
        match changes {
            PlanChanges::SetWirelessInterface(update) => Ok(Mutation::Patch {
                path: format!("{WIRELESS_PATH}/{}", update.interface),
                body: settings_body(&update.settings),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Wireless,
                operation: other.operation(),
            }),
        }
    }

    fn build_rollback(
        &self,
        changes: &PlanChanges,
        snapshot_objects: &[Value],
        _outcome: &MutationOutcome,
    ) -> Result<Vec<Mutation>, EngineError> {
        match changes {
            PlanChanges::SetWirelessInterface(update) => {
                let prior = snapshot_objects
                    .iter()
                    .find(|object| {
                        object.get("name").and_then(Value::as_str) == Some(update.interface.as_str())
                    })
                    .ok_or_else(|| {
                        EngineError::RollbackUnderivable(format!(
                            "interface '{}' is missing from the snapshot",
                            update.interface
                        ))
                    })?;
                Ok(vec![Mutation::Patch {
                    path: format!("{WIRELESS_PATH}/{}", update.interface),
                    body: restore_body(prior, &update.settings),
                }])
            }
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Wireless,
                operation: other.operation(),
            }),
        }
    }

    fn verify_collection(
        &self,
        collection: &Value,
        snapshot_objects: &[Value],
        _outcome: &MutationOutcome,
        changes: &PlanChanges,
    ) -> bool {
        let Some(interfaces) = collection.as_array() else {
            return false;
        };
        match changes {
            // The interface set itself never changes; the updated interface
            // must still be present.
            PlanChanges::SetWirelessInterface(update) => {
                interfaces.len() == snapshot_objects.len()
                    && interfaces.iter().any(|object| {
                        object.get("name").and_then(Value::as_str) == Some(update.interface.as_str())
                    })
            }
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Builds the REST body applying the populated settings.
fn settings_body(settings: &WirelessSettings) -> Value {
    let mut body = Map::new();
    if let Some(ssid) = &settings.ssid {
        body.insert("ssid".to_string(), json!(ssid));
    }
    if let Some(band) = &settings.band {
        body.insert("band".to_string(), json!(band));
    }
    if let Some(channel_width) = &settings.channel_width {
        body.insert("channel-width".to_string(), json!(channel_width));
    }
    if let Some(frequency) = &settings.frequency {
        body.insert("frequency".to_string(), json!(frequency));
    }
    if let Some(disabled) = settings.disabled {
        body.insert("disabled".to_string(), json!(disabled.to_string()));
    }
    Value::Object(body)
}

/// Builds a patch body restoring the prior values of the touched fields.
fn restore_body(prior: &Value, settings: &WirelessSettings) -> Value {
    let mut body = Map::new();
    let fields: &[(&str, bool)] = &[
        ("ssid", settings.ssid.is_some()),
        ("band", settings.band.is_some()),
        ("channel-width", settings.channel_width.is_some()),
        ("frequency", settings.frequency.is_some()),
        ("disabled", settings.disabled.is_some()),
    ];
    for (field, touched) in fields {
        if *touched {
            let value = prior.get(*field).cloned().unwrap_or(Value::String(String::new()));
            body.insert((*field).to_string(), value);
        }
    }
    Value::Object(body)
}
