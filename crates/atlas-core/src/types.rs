//! Core domain types for the Atlas inventory.
//!
//! Probes produce `Facts`; the reconciler merges them into persisted
//! `InventoryRecord` rows keyed by their natural key.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Stored in place of a value no probe could determine.
pub const UNKNOWN: &str = "Unknown";

/// Stored as the display name when no name source produced anything.
pub const NO_NAME: &str = "NoName";

// ── Scan Targets ──────────────────────────────────────────────────

/// A local network attachment point with the range to scan behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub subnet_cidr: String,
    /// The host's own address on this interface, when known.
    pub address: Option<String>,
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.subnet_cidr)
    }
}

/// A single live host to probe, as found by the discovery phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkTarget {
    pub address: String,
    pub interface_name: String,
    pub subnet_cidr: String,
    /// Name surfaced by the discovery probe itself, if any.
    pub discovered_name: Option<String>,
}

impl fmt::Display for NetworkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.interface_name)
    }
}

// ── Ports ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Filtered,
    Closed,
    Other(String),
}

impl PortState {
    pub fn parse(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "open" => Self::Open,
            "filtered" | "open|filtered" => Self::Filtered,
            "closed" | "closed|filtered" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only open and filtered ports are kept in the inventory.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Open | Self::Filtered)
    }
}

/// One port as reported by a probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortObservation {
    pub port: u16,
    pub protocol: String,
    pub state: PortState,
    pub service: Option<String>,
}

impl PortObservation {
    /// Render as `port/proto`, annotated with the service name when known.
    pub fn render(&self) -> String {
        match self.service.as_deref().filter(|s| !s.is_empty()) {
            Some(service) => format!("{}/{} ({service})", self.port, self.protocol),
            None => format!("{}/{}", self.port, self.protocol),
        }
    }
}

/// Render the reportable ports of a probe result, preserving probe order.
pub fn render_ports(ports: &[PortObservation]) -> Vec<String> {
    ports
        .iter()
        .filter(|p| p.state.is_reportable())
        .map(PortObservation::render)
        .collect()
}

/// Join rendered ports into the stored column form. Never empty.
pub fn ports_column(rendered: &[String]) -> String {
    if rendered.is_empty() {
        UNKNOWN.to_string()
    } else {
        rendered.join(", ")
    }
}

// ── Facts ─────────────────────────────────────────────────────────

/// The structured result of probing one target (host or container).
///
/// Optional fields are `None` when the probe that produced this record does
/// not observe them; the reconciler leaves the stored column untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Facts {
    pub address: String,
    pub display_name: String,
    pub os_details: Option<String>,
    pub mac_address: Option<String>,
    pub open_ports: Option<Vec<String>>,
    pub next_hop: Option<String>,
    pub network_name: String,
    pub interface_name: String,
    pub container_id: Option<String>,
    pub container_state: Option<String>,
}

impl Facts {
    /// Facts for a LAN host with only liveness confirmed.
    pub fn host(address: &str, interface_name: &str, network_name: &str) -> Self {
        Self {
            address: address.to_string(),
            display_name: NO_NAME.to_string(),
            os_details: None,
            mac_address: None,
            open_ports: None,
            next_hop: None,
            network_name: network_name.to_string(),
            interface_name: interface_name.to_string(),
            container_id: None,
            container_state: None,
        }
    }

    /// Facts for one network attachment of a container.
    pub fn container(container_id: &str, state: &str, network_name: &str) -> Self {
        Self {
            address: String::new(),
            display_name: NO_NAME.to_string(),
            os_details: None,
            mac_address: None,
            open_ports: None,
            next_hop: None,
            network_name: network_name.to_string(),
            interface_name: String::new(),
            container_id: Some(container_id.to_string()),
            container_state: Some(state.to_string()),
        }
    }

    pub fn host_key(&self) -> HostKey {
        HostKey {
            address: self.address.clone(),
            interface_name: self.interface_name.clone(),
        }
    }

    pub fn container_key(&self) -> Option<ContainerKey> {
        self.container_id.as_ref().map(|id| ContainerKey {
            container_id: id.clone(),
            network_name: self.network_name.clone(),
        })
    }

    /// Stored form of `open_ports`, if this record carries ports at all.
    pub fn ports_column(&self) -> Option<String> {
        self.open_ports.as_deref().map(ports_column)
    }

    /// Online status as implied by the facts alone.
    ///
    /// Containers follow their runtime state; hosts are online by virtue of
    /// having been probed.
    pub fn observed_status(&self) -> OnlineStatus {
        match self.container_state.as_deref() {
            Some("running") => OnlineStatus::Online,
            Some(_) => OnlineStatus::Offline,
            None => OnlineStatus::Online,
        }
    }
}

// ── Inventory ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
}

impl OnlineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnlineStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// An inventory table and its reconciliation semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InventoryDomain {
    LanHosts,
    ContainerHosts,
}

impl InventoryDomain {
    pub fn table(&self) -> &'static str {
        match self {
            Self::LanHosts => "hosts",
            Self::ContainerHosts => "docker_hosts",
        }
    }

    /// LAN history is retained: unconfirmed rows are marked offline.
    pub fn marks_offline_first(&self) -> bool {
        matches!(self, Self::LanHosts)
    }

    /// Containers are ephemeral: unconfirmed rows are deleted.
    pub fn deletes_vanished(&self) -> bool {
        matches!(self, Self::ContainerHosts)
    }
}

impl fmt::Display for InventoryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Natural key of a LAN host row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    pub address: String,
    pub interface_name: String,
}

/// Natural key of a container row: one row per attached network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerKey {
    pub container_id: String,
    pub network_name: String,
}

/// The part of a table a reconciliation pass may mark offline or delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Scope {
    /// Every row in the table.
    All,
    /// LAN rows attached to one local interface.
    Interface(String),
    /// LAN rows attached to any of the listed interfaces.
    Interfaces(Vec<String>),
    /// Every container row except those of the listed container ids.
    AllExcept(Vec<String>),
}

/// A persisted inventory row (LAN host or container).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryRecord {
    pub id: i64,
    pub address: String,
    pub display_name: String,
    pub os_details: String,
    pub mac_address: String,
    pub open_ports: String,
    pub next_hop: String,
    pub network_name: String,
    pub interface_name: String,
    pub container_id: Option<String>,
    pub container_state: Option<String>,
    pub online_status: OnlineStatus,
    pub last_seen: DateTime<Utc>,
}

/// A single egress-IP observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalNetworkRecord {
    pub public_ip: String,
    pub provider: Option<String>,
    pub location: Option<String>,
    pub last_seen: DateTime<Utc>,
}

// ── Scheduler ─────────────────────────────────────────────────────

/// The single persisted scheduler configuration row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerState {
    pub scan_interval_minutes: u32,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
}

impl SchedulerState {
    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.scan_interval_minutes))
    }
}
