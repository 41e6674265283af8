// change-gate-core/src/families/routing.rs
// ============================================================================
// Module: Routing Family Engine
// Description: Validation, risk, preview, and mutations for static routes.
// Purpose: Implement the routing write family on the shared engine seam.
// Dependencies: crate::core, crate::families, serde_json
// ============================================================================

//! ## Overview
//! Static route changes reroute traffic fleet-wide, so removals are always
//! high risk and additions escalate in production. Destination prefixes and
//! gateways are validated as addresses before a plan is created.

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
use crate::core::RouteAdd;
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
use crate::families::object_id;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// REST path of the static route collection.
const ROUTE_PATH: &str = "ip/route";

/// Largest legal administrative distance.
const MAX_DISTANCE: u32 = 255;

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Routing family engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingEngine;

impl FamilyEngine for RoutingEngine {
    fn family(&self) -> ToolFamily {
        ToolFamily::Routing
    }

    fn validate(&self, changes: &PlanChanges) -> Result<(), ValidationError> {
        match changes {
            PlanChanges::AddStaticRoute(route) => validate_route(route),
            PlanChanges::RemoveStaticRoute(remove) => {
                let mut errors = FieldErrors::new();
                if remove.route_id.trim().is_empty() {
                    errors.push("route_id", "route id must not be empty");
                }
                errors.finish()
            }
            other => Err(ValidationError::single(
                "operation",
                format!("'{}' is not a routing operation", other.operation()),
            )),
        }
    }

    fn assess_risk(&self, changes: &PlanChanges, environment: Environment) -> RiskLevel {
        match changes {
            PlanChanges::AddStaticRoute(_) if environment != Environment::Prod => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    fn preview(&self, device: &Device, changes: &PlanChanges) -> Result<PreviewDetail, EngineError> {
        let _ = device;
        match changes {
            PlanChanges::AddStaticRoute(route) => Ok(PreviewDetail::AddStaticRoute {
                destination: route.destination.clone(),
                gateway: route.gateway.clone(),
                estimated_impact: "Medium - traffic to the destination prefix is rerouted"
                    .to_string(),
            }),
            PlanChanges::RemoveStaticRoute(remove) => Ok(PreviewDetail::RemoveStaticRoute {
                route_id: remove.route_id.clone(),
                estimated_impact: "High - traffic to the destination prefix may become unreachable"
                    .to_string(),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Routing,
                operation: other.operation(),
            }),
        }
    }

    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::StaticRoutes
    }

    fn resource_path(&self) -> &'static str {
        ROUTE_PATH
    }

    fn build_mutation(&self, changes: &PlanChanges) -> Result<Mutation, EngineError> {
        match changes {
            PlanChanges::AddStaticRoute(route) => {
                let mut body = Map::new();
                body.insert("dst-address".to_string(), json!(route.destination));
                body.insert("gateway".to_string(), json!(route.gateway));
                if let Some(distance) = route.distance {
                    body.insert("distance".to_string(), json!(distance.to_string()));
                }
                if let Some(comment) = &route.comment {
                    body.insert("comment".to_string(), json!(comment));
                }
                Ok(Mutation::Post {
                    path: ROUTE_PATH.to_string(),
                    body: Value::Object(body),
                })
            }
            PlanChanges::RemoveStaticRoute(remove) => Ok(Mutation::Delete {
                path: format!("{ROUTE_PATH}/{}", remove.route_id),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Routing,
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
            PlanChanges::AddStaticRoute(_) => {
                let created = outcome.created_id.as_deref().ok_or_else(|| {
                    EngineError::RollbackUnderivable("no created route id was captured".to_string())
                })?;
                Ok(vec![Mutation::Delete {
                    path: format!("{ROUTE_PATH}/{created}"),
                }])
            }
            PlanChanges::RemoveStaticRoute(remove) => {
                let prior = find_by_id(snapshot_objects, &remove.route_id).ok_or_else(|| {
                    EngineError::RollbackUnderivable(format!(
                        "route '{}' is missing from the snapshot",
                        remove.route_id
                    ))
                })?;
                let mut body = prior.clone();
                if let Some(map) = body.as_object_mut() {
                    map.remove(ID_FIELD);
                }
                Ok(vec![Mutation::Post {
                    path: ROUTE_PATH.to_string(),
                    body,
                }])
            }
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Routing,
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
        let Some(routes) = collection.as_array() else {
            return false;
        };
        match changes {
            PlanChanges::AddStaticRoute(_) => match outcome.created_id.as_deref() {
                Some(created) => {
                    routes.iter().any(|route| object_id(route).as_deref() == Some(created))
                }
                None => false,
            },
            PlanChanges::RemoveStaticRoute(_) => routes.len() + 1 == snapshot_objects.len(),
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates the parameters of a static route addition.
///
/// # Errors
///
/// Returns [`ValidationError`] with one entry per invalid field.
pub fn validate_route(route: &RouteAdd) -> Result<(), ValidationError> {
    let mut errors = FieldErrors::new();
    if !is_valid_address(&route.destination) {
        errors.push("destination", format!("invalid destination prefix '{}'", route.destination));
    }
    if !is_valid_address(&route.gateway) {
        errors.push("gateway", format!("invalid gateway address '{}'", route.gateway));
    }
    if let Some(distance) = route.distance
        && !(1..=MAX_DISTANCE).contains(&distance)
    {
        errors.push("distance", format!("distance {distance} outside 1-{MAX_DISTANCE}"));
    }
    errors.finish()
}
