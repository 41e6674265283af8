// change-gate-core/src/families/firewall.rs
// ============================================================================
// Module: Firewall Family Engine
// Description: Validation, risk, preview, and mutations for filter rules.
// Purpose: Implement the firewall write family on the shared engine seam.
// Dependencies: crate::core, crate::families, serde_json
// ============================================================================

//! ## Overview
//! Firewall filter rules are the highest-traffic write family. Validation
//! enumerates legal chains, actions, and protocols; risk classification flags
//! management-plane exposure (input chain), aggressive actions (reject), and
//! production targets. Modifications and removals of existing rules are always
//! high risk.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::Device;
use crate::core::Environment;
use crate::core::FirewallAddRule;
use crate::core::FirewallRuleModifications;
use crate::core::PlanChanges;
use crate::core::PreviewDetail;
use crate::core::RiskLevel;
use crate::core::SnapshotKind;
use crate::core::ToolFamily;
use crate::families::EngineError;
use crate::families::FamilyEngine;
use crate::families::FieldErrors;
use crate::families::Mutation;
use crate::families::MutationOutcome;
use crate::families::ValidationError;
use crate::families::find_by_id;
use crate::families::is_valid_address;
use crate::families::is_valid_port;
use crate::families::object_id;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Legal firewall chains.
pub const VALID_CHAINS: &[&str] = &["input", "forward", "output"];

/// Legal rule actions.
pub const VALID_ACTIONS: &[&str] =
    &["accept", "drop", "reject", "jump", "return", "passthrough", "log"];

/// Legal protocols.
pub const VALID_PROTOCOLS: &[&str] =
    &["tcp", "udp", "icmp", "gre", "esp", "ah", "ipip", "ipsec-ah", "ipsec-esp"];

/// Chain whose rules affect device management exposure.
const HIGH_RISK_CHAIN: &str = "input";

/// Actions classified as more aggressive than drop.
const HIGH_RISK_ACTIONS: &[&str] = &["reject"];

/// REST path of the filter rule collection.
const FILTER_PATH: &str = "ip/firewall/filter";

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Firewall family engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirewallEngine;

impl FamilyEngine for FirewallEngine {
    fn family(&self) -> ToolFamily {
        ToolFamily::Firewall
    }

    fn validate(&self, changes: &PlanChanges) -> Result<(), ValidationError> {
        match changes {
            PlanChanges::AddFirewallRule(rule) => validate_rule_params(rule),
            PlanChanges::ModifyFirewallRule(modify) => {
                let mut errors = FieldErrors::new();
                if modify.rule_id.trim().is_empty() {
                    errors.push("rule_id", "rule id must not be empty");
                }
                if !VALID_CHAINS.contains(&modify.chain.as_str()) {
                    errors.push(
                        "chain",
                        format!(
                            "invalid chain '{}'; must be one of: {}",
                            modify.chain,
                            VALID_CHAINS.join(", ")
                        ),
                    );
                }
                if modify.modifications.is_empty() {
                    errors.push("modifications", "At least one modification must be provided");
                }
                validate_modifications(&modify.modifications, &mut errors);
                errors.finish()
            }
            PlanChanges::RemoveFirewallRule(remove) => {
                let mut errors = FieldErrors::new();
                if remove.rule_id.trim().is_empty() {
                    errors.push("rule_id", "rule id must not be empty");
                }
                if !VALID_CHAINS.contains(&remove.chain.as_str()) {
                    errors.push(
                        "chain",
                        format!(
                            "invalid chain '{}'; must be one of: {}",
                            remove.chain,
                            VALID_CHAINS.join(", ")
                        ),
                    );
                }
                errors.finish()
            }
            other => Err(ValidationError::single(
                "operation",
                format!("'{}' is not a firewall operation", other.operation()),
            )),
        }
    }

    fn assess_risk(&self, changes: &PlanChanges, environment: Environment) -> RiskLevel {
        match changes {
            PlanChanges::AddFirewallRule(rule) => {
                if rule.chain == HIGH_RISK_CHAIN
                    || HIGH_RISK_ACTIONS.contains(&rule.action.as_str())
                    || environment == Environment::Prod
                {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                }
            }
            // Touching an existing rule is always high risk.
            _ => RiskLevel::High,
        }
    }

    fn preview(&self, device: &Device, changes: &PlanChanges) -> Result<PreviewDetail, EngineError> {
        let _ = device;
        match changes {
            PlanChanges::AddFirewallRule(rule) => Ok(PreviewDetail::AddFirewallRule {
                chain: rule.chain.clone(),
                position: "auto".to_string(),
                rule_spec: rule_spec(rule),
                estimated_impact:
                    "Low - rule added to end of chain, existing connections unaffected".to_string(),
            }),
            PlanChanges::ModifyFirewallRule(modify) => Ok(PreviewDetail::ModifyFirewallRule {
                rule_id: modify.rule_id.clone(),
                chain: modify.chain.clone(),
                modifications: modify.modifications.clone(),
                estimated_impact: "Medium - existing rule modified, may affect active connections"
                    .to_string(),
            }),
            PlanChanges::RemoveFirewallRule(remove) => Ok(PreviewDetail::RemoveFirewallRule {
                rule_id: remove.rule_id.clone(),
                chain: remove.chain.clone(),
                estimated_impact: "Medium - rule removal may allow previously blocked traffic"
                    .to_string(),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Firewall,
                operation: other.operation(),
            }),
        }
    }

    fn snapshot_kind(&self) -> SnapshotKind {
        SnapshotKind::FirewallFilterRules
    }

    fn resource_path(&self) -> &'static str {
        FILTER_PATH
    }

    fn build_mutation(&self, changes: &PlanChanges) -> Result<Mutation, EngineError> {
        match changes {
            PlanChanges::AddFirewallRule(rule) => Ok(Mutation::Post {
                path: FILTER_PATH.to_string(),
                body: rule_body(rule),
            }),
            PlanChanges::ModifyFirewallRule(modify) => Ok(Mutation::Patch {
                path: format!("{FILTER_PATH}/{}", modify.rule_id),
                body: modifications_body(&modify.modifications),
            }),
            PlanChanges::RemoveFirewallRule(remove) => Ok(Mutation::Delete {
                path: format!("{FILTER_PATH}/{}", remove.rule_id),
            }),
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Firewall,
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
            PlanChanges::AddFirewallRule(_) => {
                let created = outcome.created_id.as_deref().ok_or_else(|| {
                    EngineError::RollbackUnderivable(
                        "no created rule id was captured".to_string(),
                    )
                })?;
                Ok(vec![Mutation::Delete {
                    path: format!("{FILTER_PATH}/{created}"),
                }])
            }
            PlanChanges::ModifyFirewallRule(modify) => {
                let prior = find_by_id(snapshot_objects, &modify.rule_id).ok_or_else(|| {
                    EngineError::RollbackUnderivable(format!(
                        "rule '{}' is missing from the snapshot",
                        modify.rule_id
                    ))
                })?;
                Ok(vec![Mutation::Patch {
                    path: format!("{FILTER_PATH}/{}", modify.rule_id),
                    body: restore_body(prior, &modify.modifications),
                }])
            }
            PlanChanges::RemoveFirewallRule(remove) => {
                let prior = find_by_id(snapshot_objects, &remove.rule_id).ok_or_else(|| {
                    EngineError::RollbackUnderivable(format!(
                        "rule '{}' is missing from the snapshot",
                        remove.rule_id
                    ))
                })?;
                let mut body = prior.clone();
                if let Some(map) = body.as_object_mut() {
                    map.remove(crate::families::ID_FIELD);
                }
                Ok(vec![Mutation::Post {
                    path: FILTER_PATH.to_string(),
                    body,
                }])
            }
            other => Err(EngineError::UnsupportedOperation {
                family: ToolFamily::Firewall,
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
        let Some(rules) = collection.as_array() else {
            return false;
        };
        match changes {
            PlanChanges::AddFirewallRule(_) => match outcome.created_id.as_deref() {
                Some(created) => {
                    rules.iter().any(|rule| object_id(rule).as_deref() == Some(created))
                }
                None => false,
            },
            PlanChanges::ModifyFirewallRule(_) => rules.len() == snapshot_objects.len(),
            PlanChanges::RemoveFirewallRule(_) => {
                rules.len() + 1 == snapshot_objects.len()
            }
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates the parameters of a rule addition.
///
/// # Errors
///
/// Returns [`ValidationError`] with one entry per invalid field.
pub fn validate_rule_params(rule: &FirewallAddRule) -> Result<(), ValidationError> {
    let mut errors = FieldErrors::new();

    if !VALID_CHAINS.contains(&rule.chain.as_str()) {
        errors.push(
            "chain",
            format!("invalid chain '{}'; must be one of: {}", rule.chain, VALID_CHAINS.join(", ")),
        );
    }
    if !VALID_ACTIONS.contains(&rule.action.as_str()) {
        errors.push(
            "action",
            format!(
                "invalid action '{}'; must be one of: {}",
                rule.action,
                VALID_ACTIONS.join(", ")
            ),
        );
    }
    if let Some(src_address) = &rule.src_address
        && !is_valid_address(src_address)
    {
        errors.push("src_address", format!("invalid source address '{src_address}'"));
    }
    if let Some(dst_address) = &rule.dst_address
        && !is_valid_address(dst_address)
    {
        errors.push("dst_address", format!("invalid destination address '{dst_address}'"));
    }
    if let Some(protocol) = &rule.protocol
        && !VALID_PROTOCOLS.contains(&protocol.as_str())
    {
        errors.push(
            "protocol",
            format!(
                "invalid protocol '{protocol}'; must be one of: {}",
                VALID_PROTOCOLS.join(", ")
            ),
        );
    }
    if let Some(dst_port) = &rule.dst_port
        && !is_valid_port(dst_port)
    {
        errors.push(
            "dst_port",
            format!(
                "invalid destination port '{dst_port}'; must be a number (1-65535) or range (e.g., '8000-9000')"
            ),
        );
    }

    errors.finish()
}

/// Validates populated modification fields against the same enumerations.
fn validate_modifications(modifications: &FirewallRuleModifications, errors: &mut FieldErrors) {
    if let Some(action) = &modifications.action
        && !VALID_ACTIONS.contains(&action.as_str())
    {
        errors.push(
            "modifications.action",
            format!("invalid action '{action}'; must be one of: {}", VALID_ACTIONS.join(", ")),
        );
    }
    if let Some(src_address) = &modifications.src_address
        && !is_valid_address(src_address)
    {
        errors.push("modifications.src_address", format!("invalid source address '{src_address}'"));
    }
    if let Some(dst_address) = &modifications.dst_address
        && !is_valid_address(dst_address)
    {
        errors.push(
            "modifications.dst_address",
            format!("invalid destination address '{dst_address}'"),
        );
    }
    if let Some(protocol) = &modifications.protocol
        && !VALID_PROTOCOLS.contains(&protocol.as_str())
    {
        errors.push(
            "modifications.protocol",
            format!("invalid protocol '{protocol}'; must be one of: {}", VALID_PROTOCOLS.join(", ")),
        );
    }
    if let Some(dst_port) = &modifications.dst_port
        && !is_valid_port(dst_port)
    {
        errors.push("modifications.dst_port", format!("invalid destination port '{dst_port}'"));
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Reconstructs the rule specification string with key=value tokens in a
/// stable order: chain, action, src-address, dst-address, protocol,
/// dst-port, comment.
#[must_use]
pub fn rule_spec(rule: &FirewallAddRule) -> String {
    let mut parts = vec![format!("chain={}", rule.chain), format!("action={}", rule.action)];
    if let Some(src_address) = &rule.src_address {
        parts.push(format!("src-address={src_address}"));
    }
    if let Some(dst_address) = &rule.dst_address {
        parts.push(format!("dst-address={dst_address}"));
    }
    if let Some(protocol) = &rule.protocol {
        parts.push(format!("protocol={protocol}"));
    }
    if let Some(dst_port) = &rule.dst_port {
        parts.push(format!("dst-port={dst_port}"));
    }
    if let Some(comment) = &rule.comment {
        parts.push(format!("comment={comment}"));
    }
    parts.join(" ")
}

/// Builds the REST body for a rule addition.
fn rule_body(rule: &FirewallAddRule) -> Value {
    let mut body = Map::new();
    body.insert("chain".to_string(), json!(rule.chain));
    body.insert("action".to_string(), json!(rule.action));
    if let Some(src_address) = &rule.src_address {
        body.insert("src-address".to_string(), json!(src_address));
    }
    if let Some(dst_address) = &rule.dst_address {
        body.insert("dst-address".to_string(), json!(dst_address));
    }
    if let Some(protocol) = &rule.protocol {
        body.insert("protocol".to_string(), json!(protocol));
    }
    if let Some(dst_port) = &rule.dst_port {
        body.insert("dst-port".to_string(), json!(dst_port));
    }
    if let Some(comment) = &rule.comment {
        body.insert("comment".to_string(), json!(comment));
    }
    Value::Object(body)
}

/// Builds the REST body for a rule modification.
fn modifications_body(modifications: &FirewallRuleModifications) -> Value {
    let mut body = Map::new();
    if let Some(action) = &modifications.action {
        body.insert("action".to_string(), json!(action));
    }
    if let Some(src_address) = &modifications.src_address {
        body.insert("src-address".to_string(), json!(src_address));
    }
    if let Some(dst_address) = &modifications.dst_address {
        body.insert("dst-address".to_string(), json!(dst_address));
    }
    if let Some(protocol) = &modifications.protocol {
        body.insert("protocol".to_string(), json!(protocol));
    }
    if let Some(dst_port) = &modifications.dst_port {
        body.insert("dst-port".to_string(), json!(dst_port));
    }
    if let Some(comment) = &modifications.comment {
        body.insert("comment".to_string(), json!(comment));
    }
    if let Some(disabled) = modifications.disabled {
        body.insert("disabled".to_string(), json!(disabled.to_string()));
    }
    Value::Object(body)
}

/// Builds a patch body restoring the prior values of every modified field.
fn restore_body(prior: &Value, modifications: &FirewallRuleModifications) -> Value {
    let mut body = Map::new();
    let fields: &[(&str, bool)] = &[
        ("action", modifications.action.is_some()),
        ("src-address", modifications.src_address.is_some()),
        ("dst-address", modifications.dst_address.is_some()),
        ("protocol", modifications.protocol.is_some()),
        ("dst-port", modifications.dst_port.is_some()),
        ("comment", modifications.comment.is_some()),
        ("disabled", modifications.disabled.is_some()),
    ];
    for (field, modified) in fields {
        if *modified {
            // Restore the prior value, or clear the field if it was absent.
            let value = prior.get(*field).cloned().unwrap_or(Value::String(String::new()));
            body.insert((*field).to_string(), value);
        }
    }
    Value::Object(body)
}
