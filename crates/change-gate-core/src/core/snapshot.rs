// change-gate-core/src/core/snapshot.rs
// ============================================================================
// Module: Change Gate Snapshot Model
// Description: Pre-mutation device images used as rollback sources.
// Purpose: Address snapshots by id and keep their payloads opaque to the core.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! A snapshot captures the affected resource collection exactly as the device
//! reported it before a mutation. The payload is an opaque byte blob (JSON as
//! fetched from the device); structured metadata records what was captured.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::DeviceId;
use crate::core::identifiers::SnapshotId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Snapshot Kind
// ============================================================================

/// Resource collection a snapshot captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Firewall filter rules.
    FirewallFilterRules,
    /// Static routes.
    StaticRoutes,
    /// Wireless interface configurations.
    WirelessInterfaces,
    /// DHCP lease reservations.
    DhcpLeases,
    /// Bridge VLAN entries.
    BridgeVlans,
}

impl SnapshotKind {
    /// Returns the lowercase label for the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirewallFilterRules => "firewall_filter_rules",
            Self::StaticRoutes => "static_routes",
            Self::WirelessInterfaces => "wireless_interfaces",
            Self::DhcpLeases => "dhcp_leases",
            Self::BridgeVlans => "bridge_vlans",
        }
    }
}

// ============================================================================
// SECTION: Snapshot Record
// ============================================================================

/// Pre-mutation image of a device resource collection.
///
/// # Invariants
/// - Written before any mutation of the captured collection.
/// - `data` is opaque to the core; only the owning family engine interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot identifier.
    pub id: SnapshotId,
    /// Device the snapshot was taken from.
    pub device_id: DeviceId,
    /// Capture timestamp.
    pub timestamp: Timestamp,
    /// Captured resource collection.
    pub kind: SnapshotKind,
    /// Opaque payload bytes as fetched from the device.
    pub data: Vec<u8>,
    /// Structured capture metadata.
    pub meta: Value,
}
