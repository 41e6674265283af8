// change-gate-core/src/core/changes.rs
// ============================================================================
// Module: Change Gate Planned Changes
// Description: Operation-tagged change payloads and per-device previews.
// Purpose: Type the dynamic change dictionaries at the service boundary.
// Dependencies: crate::core::{device, identifiers}, serde
// ============================================================================

//! ## Overview
//! Every plan carries a structured [`PlanChanges`] value tagged by operation.
//! The payloads are validated by the per-family engines before a plan row is
//! persisted, and rendered into [`DevicePreview`] records for operators.
//! Stores persist these as JSON blobs; the tag keeps them self-describing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::device::Environment;
use crate::core::device::ToolFamily;
use crate::core::identifiers::DeviceId;

// ============================================================================
// SECTION: Firewall Payloads
// ============================================================================

/// Parameters for adding a firewall filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallAddRule {
    /// Firewall chain (input/forward/output).
    pub chain: String,
    /// Rule action (accept/drop/reject/...).
    pub action: String,
    /// Optional source address (IP or CIDR).
    pub src_address: Option<String>,
    /// Optional destination address (IP or CIDR).
    pub dst_address: Option<String>,
    /// Optional protocol.
    pub protocol: Option<String>,
    /// Optional destination port or port range.
    pub dst_port: Option<String>,
    /// Optional rule comment.
    pub comment: Option<String>,
}

/// Field-level modifications applied to an existing firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirewallRuleModifications {
    /// Replacement action.
    pub action: Option<String>,
    /// Replacement source address.
    pub src_address: Option<String>,
    /// Replacement destination address.
    pub dst_address: Option<String>,
    /// Replacement protocol.
    pub protocol: Option<String>,
    /// Replacement destination port.
    pub dst_port: Option<String>,
    /// Replacement comment.
    pub comment: Option<String>,
    /// Replacement disabled flag.
    pub disabled: Option<bool>,
}

impl FirewallRuleModifications {
    /// Returns true when no modification field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.action.is_none()
            && self.src_address.is_none()
            && self.dst_address.is_none()
            && self.protocol.is_none()
            && self.dst_port.is_none()
            && self.comment.is_none()
            && self.disabled.is_none()
    }
}

/// Parameters for modifying an existing firewall filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallModifyRule {
    /// Device-assigned rule identifier.
    pub rule_id: String,
    /// Chain the rule lives in.
    pub chain: String,
    /// Field modifications to apply.
    pub modifications: FirewallRuleModifications,
}

/// Parameters for removing an existing firewall filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRemoveRule {
    /// Device-assigned rule identifier.
    pub rule_id: String,
    /// Chain the rule lives in.
    pub chain: String,
}

// ============================================================================
// SECTION: Routing Payloads
// ============================================================================

/// Parameters for adding a static route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAdd {
    /// Destination prefix (CIDR).
    pub destination: String,
    /// Next-hop gateway address.
    pub gateway: String,
    /// Optional administrative distance.
    pub distance: Option<u32>,
    /// Optional route comment.
    pub comment: Option<String>,
}

/// Parameters for removing a static route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRemove {
    /// Device-assigned route identifier.
    pub route_id: String,
}

// ============================================================================
// SECTION: Wireless Payloads
// ============================================================================

/// Field updates applied to a wireless interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WirelessSettings {
    /// Replacement SSID.
    pub ssid: Option<String>,
    /// Replacement radio band.
    pub band: Option<String>,
    /// Replacement channel width.
    pub channel_width: Option<String>,
    /// Replacement operating frequency.
    pub frequency: Option<String>,
    /// Replacement disabled flag.
    pub disabled: Option<bool>,
}

impl WirelessSettings {
    /// Returns true when no setting field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ssid.is_none()
            && self.band.is_none()
            && self.channel_width.is_none()
            && self.frequency.is_none()
            && self.disabled.is_none()
    }
}

/// Parameters for updating a wireless interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirelessInterfaceUpdate {
    /// Interface name on the device.
    pub interface: String,
    /// Settings to apply.
    pub settings: WirelessSettings,
}

// ============================================================================
// SECTION: DHCP Payloads
// ============================================================================

/// Parameters for adding a DHCP lease reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLeaseAdd {
    /// Reserved IP address.
    pub address: String,
    /// Client MAC address.
    pub mac_address: String,
    /// Optional DHCP server name.
    pub server: Option<String>,
    /// Optional lease comment.
    pub comment: Option<String>,
}

/// Parameters for removing a DHCP lease reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLeaseRemove {
    /// Device-assigned lease identifier.
    pub lease_id: String,
}

// ============================================================================
// SECTION: Bridge Payloads
// ============================================================================

/// Parameters for adding a bridge VLAN entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeVlanAdd {
    /// Bridge interface name.
    pub bridge: String,
    /// VLAN identifiers covered by the entry.
    pub vlan_ids: Vec<u16>,
    /// Ports carrying the VLANs tagged.
    pub tagged_ports: Vec<String>,
    /// Ports carrying the VLANs untagged.
    pub untagged_ports: Vec<String>,
}

/// Parameters for removing a bridge VLAN entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeVlanRemove {
    /// Device-assigned VLAN entry identifier.
    pub vlan_entry_id: String,
}

// ============================================================================
// SECTION: Plan Changes
// ============================================================================

/// Operation-tagged change payload carried by a plan.
///
/// # Invariants
/// - The tag is stable for serialization and audit matching.
/// - Payloads are validated by the owning family engine before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PlanChanges {
    /// Add a firewall filter rule.
    AddFirewallRule(FirewallAddRule),
    /// Modify an existing firewall filter rule.
    ModifyFirewallRule(FirewallModifyRule),
    /// Remove an existing firewall filter rule.
    RemoveFirewallRule(FirewallRemoveRule),
    /// Add a static route.
    AddStaticRoute(RouteAdd),
    /// Remove a static route.
    RemoveStaticRoute(RouteRemove),
    /// Update a wireless interface configuration.
    SetWirelessInterface(WirelessInterfaceUpdate),
    /// Add a DHCP lease reservation.
    AddDhcpLease(DhcpLeaseAdd),
    /// Remove a DHCP lease reservation.
    RemoveDhcpLease(DhcpLeaseRemove),
    /// Add a bridge VLAN entry.
    AddBridgeVlan(BridgeVlanAdd),
    /// Remove a bridge VLAN entry.
    RemoveBridgeVlan(BridgeVlanRemove),
}

impl PlanChanges {
    /// Returns the tool family that owns this operation.
    #[must_use]
    pub const fn family(&self) -> ToolFamily {
        match self {
            Self::AddFirewallRule(_) | Self::ModifyFirewallRule(_) | Self::RemoveFirewallRule(_) => {
                ToolFamily::Firewall
            }
            Self::AddStaticRoute(_) | Self::RemoveStaticRoute(_) => ToolFamily::Routing,
            Self::SetWirelessInterface(_) => ToolFamily::Wireless,
            Self::AddDhcpLease(_) | Self::RemoveDhcpLease(_) => ToolFamily::Dhcp,
            Self::AddBridgeVlan(_) | Self::RemoveBridgeVlan(_) => ToolFamily::Bridge,
        }
    }

    /// Returns the stable operation label used in previews and audit meta.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::AddFirewallRule(_) => "add_firewall_rule",
            Self::ModifyFirewallRule(_) => "modify_firewall_rule",
            Self::RemoveFirewallRule(_) => "remove_firewall_rule",
            Self::AddStaticRoute(_) => "add_static_route",
            Self::RemoveStaticRoute(_) => "remove_static_route",
            Self::SetWirelessInterface(_) => "set_wireless_interface",
            Self::AddDhcpLease(_) => "add_dhcp_lease",
            Self::RemoveDhcpLease(_) => "remove_dhcp_lease",
            Self::AddBridgeVlan(_) => "add_bridge_vlan",
            Self::RemoveBridgeVlan(_) => "remove_bridge_vlan",
        }
    }

    /// Returns true for operations that mutate or delete existing objects.
    #[must_use]
    pub const fn touches_existing_object(&self) -> bool {
        matches!(
            self,
            Self::ModifyFirewallRule(_)
                | Self::RemoveFirewallRule(_)
                | Self::RemoveStaticRoute(_)
                | Self::SetWirelessInterface(_)
                | Self::RemoveDhcpLease(_)
                | Self::RemoveBridgeVlan(_)
        )
    }
}

// ============================================================================
// SECTION: Previews
// ============================================================================

/// Pre-check outcome recorded per device during planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreCheckStatus {
    /// All pre-checks passed.
    Passed,
    /// A pre-check failed.
    Failed,
}

/// Operation-specific preview payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PreviewDetail {
    /// Preview of a firewall rule addition.
    AddFirewallRule {
        /// Target chain.
        chain: String,
        /// Insertion position within the chain.
        position: String,
        /// Reconstructed rule specification string.
        rule_spec: String,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a firewall rule modification.
    ModifyFirewallRule {
        /// Device-assigned rule identifier.
        rule_id: String,
        /// Chain the rule lives in.
        chain: String,
        /// Modifications to apply.
        modifications: FirewallRuleModifications,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a firewall rule removal.
    RemoveFirewallRule {
        /// Device-assigned rule identifier.
        rule_id: String,
        /// Chain the rule lives in.
        chain: String,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a static route addition.
    AddStaticRoute {
        /// Destination prefix.
        destination: String,
        /// Next-hop gateway.
        gateway: String,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a static route removal.
    RemoveStaticRoute {
        /// Device-assigned route identifier.
        route_id: String,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a wireless interface update.
    SetWirelessInterface {
        /// Interface name on the device.
        interface: String,
        /// Settings to apply.
        settings: WirelessSettings,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a DHCP lease addition.
    AddDhcpLease {
        /// Reserved IP address.
        address: String,
        /// Client MAC address.
        mac_address: String,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a DHCP lease removal.
    RemoveDhcpLease {
        /// Device-assigned lease identifier.
        lease_id: String,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a bridge VLAN addition.
    AddBridgeVlan {
        /// Bridge interface name.
        bridge: String,
        /// VLAN identifiers covered by the entry.
        vlan_ids: Vec<u16>,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
    /// Preview of a bridge VLAN removal.
    RemoveBridgeVlan {
        /// Device-assigned VLAN entry identifier.
        vlan_entry_id: String,
        /// Operator-facing impact estimate.
        estimated_impact: String,
    },
}

/// Per-device preview record returned from plan creation.
///
/// # Invariants
/// - `operation` matches the plan's [`PlanChanges::operation`] label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePreview {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Device name.
    pub name: String,
    /// Device environment.
    pub environment: Environment,
    /// Operation label.
    pub operation: String,
    /// Pre-check outcome for the device.
    pub pre_check_status: PreCheckStatus,
    /// Operation-specific preview payload.
    pub preview: PreviewDetail,
}
