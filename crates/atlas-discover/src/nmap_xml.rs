//! Nmap XML output deserialization.
//!
//! Both the liveness sweep and the deep probe run nmap with `-oX -`; this
//! module turns that XML into typed structs with `quick-xml` + serde and
//! exposes the few projections the probes need.

use serde::Deserialize;

use atlas_core::{PortObservation, PortState};

use crate::error::{DiscoverError, Result};
use crate::probe::LiveHost;

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<OsMatches>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub entries: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub entries: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: NmapPortState,
    pub service: Option<NmapService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPortState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatches {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: Option<String>,
}

impl NmapRun {
    /// Hosts reported up that carry an IPv4 address.
    pub fn live_hosts(&self) -> Vec<LiveHost> {
        self.hosts
            .iter()
            .filter(|h| h.is_up())
            .filter_map(|h| {
                h.ipv4().map(|address| LiveHost {
                    address: address.to_string(),
                    name: h.hostname().map(String::from),
                    mac_address: h.mac().map(String::from),
                })
            })
            .collect()
    }

    /// The up host with the given address, if nmap reported it.
    pub fn host(&self, address: &str) -> Option<&NmapHost> {
        self.hosts
            .iter()
            .find(|h| h.is_up() && h.ipv4() == Some(address))
    }
}

impl NmapHost {
    pub fn ipv4(&self) -> Option<&str> {
        self.address_of("ipv4")
    }

    pub fn mac(&self) -> Option<&str> {
        self.address_of("mac")
    }

    fn address_of(&self, kind: &str) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == kind)
            .map(|a| a.addr.as_str())
    }

    /// The PTR name if nmap resolved one, else any other non-empty name.
    pub fn hostname(&self) -> Option<&str> {
        let entries = &self.hostnames.as_ref()?.entries;
        entries
            .iter()
            .find(|h| h.kind.as_deref() == Some("PTR") && !h.name.is_empty())
            .or_else(|| entries.iter().find(|h| !h.name.is_empty()))
            .map(|h| h.name.as_str())
    }

    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// OS guess with the highest accuracy; ties keep nmap's order.
    pub fn os_name(&self) -> Option<&str> {
        let matches = &self.os.as_ref()?.matches;
        let mut best: Option<(&OsMatch, u32)> = None;
        for candidate in matches {
            let accuracy = candidate
                .accuracy
                .as_deref()
                .and_then(|a| a.parse::<u32>().ok())
                .unwrap_or(0);
            if best.map_or(true, |(_, top)| accuracy > top) {
                best = Some((candidate, accuracy));
            }
        }
        best.map(|(m, _)| m.name.as_str())
    }

    /// Every port nmap listed, in its order, with parsed state.
    pub fn port_observations(&self) -> Vec<PortObservation> {
        self.ports
            .as_ref()
            .map(|ports| {
                ports
                    .entries
                    .iter()
                    .map(|p| PortObservation {
                        port: p.port_id,
                        protocol: p.protocol.clone(),
                        state: PortState::parse(&p.state.state),
                        service: p.service.as_ref().map(|s| s.name.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}
