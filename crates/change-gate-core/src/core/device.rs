// change-gate-core/src/core/device.rs
// ============================================================================
// Module: Change Gate Device Model
// Description: Device records, environments, statuses, and capability flags.
// Purpose: Model the managed-device inventory consumed by planning and apply.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Devices are the unit of targeting for every plan. Each record carries an
//! environment classification, a health status, free-form tags, and the
//! capability flags that gate write tool families. The registry exposes the
//! flags verbatim; enforcement lives in the plan service.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::DeviceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Environment
// ============================================================================

/// Deployment environment for a managed device.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Lab environment used for experimentation.
    Lab,
    /// Staging environment mirroring production.
    Staging,
    /// Production environment with restricted writes.
    Prod,
}

impl Environment {
    /// Returns the lowercase label for the environment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lab => "lab",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when an environment label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown environment '{label}'")]
pub struct EnvironmentParseError {
    /// Label that failed to parse.
    pub label: String,
}

impl FromStr for Environment {
    type Err = EnvironmentParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lab" => Ok(Self::Lab),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => Err(EnvironmentParseError {
                label: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// SECTION: Device Status
// ============================================================================

/// Operational status reported for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Device is reachable and healthy.
    Healthy,
    /// Device is reachable but degraded.
    Degraded,
    /// Device status has not been established.
    Unknown,
    /// Device has been retired from management.
    Retired,
}

impl DeviceStatus {
    /// Returns the lowercase label for the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unknown => "unknown",
            Self::Retired => "retired",
        }
    }
}

// ============================================================================
// SECTION: Capability Flags
// ============================================================================

/// Per-device capability flags gating write tool families.
///
/// # Invariants
/// - Every flag defaults to `false`; grants are explicit administrative acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// Allow advanced tier writes.
    pub allow_advanced_writes: bool,
    /// Allow professional tier plan/apply workflows.
    pub allow_professional_workflows: bool,
    /// Allow firewall filter rule writes.
    pub allow_firewall_writes: bool,
    /// Allow static route and routing policy writes.
    pub allow_routing_writes: bool,
    /// Allow wireless configuration writes.
    pub allow_wireless_writes: bool,
    /// Allow DHCP server configuration writes.
    pub allow_dhcp_writes: bool,
    /// Allow bridge and VLAN configuration writes.
    pub allow_bridge_writes: bool,
}

impl CapabilityFlags {
    /// Returns the flag value gating the given tool family.
    #[must_use]
    pub const fn allows(&self, family: ToolFamily) -> bool {
        match family {
            ToolFamily::Firewall => self.allow_firewall_writes,
            ToolFamily::Routing => self.allow_routing_writes,
            ToolFamily::Wireless => self.allow_wireless_writes,
            ToolFamily::Dhcp => self.allow_dhcp_writes,
            ToolFamily::Bridge => self.allow_bridge_writes,
        }
    }
}

// ============================================================================
// SECTION: Tool Families
// ============================================================================

/// Write tool families subject to capability gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFamily {
    /// Firewall filter rule operations.
    Firewall,
    /// Static route operations.
    Routing,
    /// Wireless interface operations.
    Wireless,
    /// DHCP server operations.
    Dhcp,
    /// Bridge and VLAN operations.
    Bridge,
}

impl ToolFamily {
    /// Returns the lowercase label for the family.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Firewall => "firewall",
            Self::Routing => "routing",
            Self::Wireless => "wireless",
            Self::Dhcp => "dhcp",
            Self::Bridge => "bridge",
        }
    }

    /// Returns the capability flag name required for writes in this family.
    #[must_use]
    pub const fn required_capability(&self) -> &'static str {
        match self {
            Self::Firewall => "allow_firewall_writes",
            Self::Routing => "allow_routing_writes",
            Self::Wireless => "allow_wireless_writes",
            Self::Dhcp => "allow_dhcp_writes",
            Self::Bridge => "allow_bridge_writes",
        }
    }

    /// Returns the environments in which writes for this family are permitted
    /// when production writes are denied by policy.
    #[must_use]
    pub const fn allowed_environments(&self) -> &'static [Environment] {
        &[Environment::Lab, Environment::Staging]
    }
}

impl fmt::Display for ToolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Device Record
// ============================================================================

/// Managed device record owned by the device registry.
///
/// # Invariants
/// - `environment` is normalized to lowercase at the registry boundary.
/// - Capability flags are exposed verbatim; callers enforce gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device identifier.
    pub id: DeviceId,
    /// Unique human-readable device name.
    pub name: String,
    /// Management address (host or host:port).
    pub management_address: String,
    /// Deployment environment.
    pub environment: Environment,
    /// Operational status.
    pub status: DeviceStatus,
    /// Free-form tags.
    pub tags: BTreeSet<String>,
    /// Capability flags gating write families.
    pub capabilities: CapabilityFlags,
    /// Operating system version reported by the device.
    pub os_version: Option<String>,
    /// System identity reported by the device.
    pub system_identity: Option<String>,
    /// Hardware model reported by the device.
    pub hardware_model: Option<String>,
    /// Serial number reported by the device.
    pub serial_number: Option<String>,
    /// Timestamp of the last successful contact.
    pub last_seen_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Device Filter
// ============================================================================

/// Filter applied to device listing queries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceFilter {
    /// Restrict to a single environment.
    pub environment: Option<Environment>,
    /// Restrict to a single status.
    pub status: Option<DeviceStatus>,
    /// Require the given tag to be present.
    pub tag: Option<String>,
}

impl DeviceFilter {
    /// Returns true when the device matches every populated criterion.
    #[must_use]
    pub fn matches(&self, device: &Device) -> bool {
        if let Some(environment) = self.environment
            && device.environment != environment
        {
            return false;
        }
        if let Some(status) = self.status
            && device.status != status
        {
            return false;
        }
        if let Some(tag) = &self.tag
            && !device.tags.contains(tag)
        {
            return false;
        }
        true
    }
}
