//! Nmap-backed host probe.
//!
//! Executes nmap as a child process via `tokio::process::Command` with
//! `-oX -` and turns the parsed XML into live hosts or `Facts`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use atlas_core::types::render_ports;
use atlas_core::{Facts, NetworkTarget};

use crate::config::{DiscoverConfig, ScanProfile};
use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapRun};
use crate::probe::{HostProbe, LiveHost};
use crate::process::run_tool;

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
    deep_profile: ScanProfile,
    network_name: String,
    arp_table_path: PathBuf,
    discovery_timeout: Duration,
    deep_timeout: Duration,
}

impl NmapScanner {
    pub fn new(config: &DiscoverConfig) -> Self {
        Self {
            nmap_path: config.nmap_path.clone(),
            deep_profile: config.deep_profile.clone(),
            network_name: config.network_name.clone(),
            arp_table_path: config.arp_table_path.clone(),
            discovery_timeout: config.discovery_timeout(),
            deep_timeout: config.deep_timeout(),
        }
    }

    async fn run(&self, target: &str, profile: &ScanProfile, limit: Duration) -> Result<NmapRun> {
        let start = Instant::now();
        let mut args: Vec<&str> = profile.nmap_flags();
        args.extend(["-oX", "-", "--noninteractive", target]);

        tracing::debug!(target = %target, profile = ?profile, "Starting nmap");
        let stdout = run_tool("nmap", &self.nmap_path, &args, target, limit).await?;
        let run = nmap_xml::parse_nmap_xml(&stdout)?;

        tracing::debug!(
            target = %target,
            hosts = run.hosts.len(),
            duration_ms = start.elapsed().as_millis(),
            "Nmap finished"
        );
        Ok(run)
    }

    async fn arp_mac(&self, address: &str) -> Option<String> {
        match tokio::fs::read_to_string(&self.arp_table_path).await {
            Ok(table) => arp_lookup(&table, address),
            Err(e) => {
                tracing::debug!(path = %self.arp_table_path.display(), error = %e, "ARP table unreadable");
                None
            }
        }
    }
}

#[async_trait]
impl HostProbe for NmapScanner {
    async fn discover_live(&self, subnet_cidr: &str) -> Result<Vec<LiveHost>> {
        let run = self
            .run(subnet_cidr, &ScanProfile::Quick, self.discovery_timeout)
            .await?;
        Ok(run.live_hosts())
    }

    async fn probe_host(&self, target: &NetworkTarget) -> Result<Facts> {
        let run = self
            .run(&target.address, &self.deep_profile, self.deep_timeout)
            .await?;
        let host = run
            .host(&target.address)
            .ok_or_else(|| DiscoverError::MissingFromOutput {
                tool: "nmap".to_string(),
                target: target.address.clone(),
            })?;

        let mac_address = match host.mac() {
            Some(mac) => Some(mac.to_string()),
            None => self.arp_mac(&target.address).await,
        };

        Ok(Facts {
            os_details: host.os_name().map(String::from),
            mac_address,
            open_ports: Some(render_ports(&host.port_observations())),
            ..Facts::host(&target.address, &target.interface_name, &self.network_name)
        })
    }
}

/// Find the hardware address for `address` in `/proc/net/arp` content.
///
/// Incomplete entries (all-zero MAC) are ignored.
pub fn arp_lookup(table: &str, address: &str) -> Option<String> {
    table
        .lines()
        .skip(1)
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.len() >= 4 && fields[0] == address)
        .map(|fields| fields[3].to_string())
        .filter(|mac| mac != "00:00:00:00:00:00")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARP_TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.2.1      0x1         0x2         3c:22:fb:00:00:01     *        eth0
192.168.2.40     0x1         0x2         dc:a6:32:00:00:40     *        eth0
192.168.2.99     0x1         0x0         00:00:00:00:00:00     *        eth0
";

    #[test]
    fn test_arp_lookup() {
        assert_eq!(
            arp_lookup(ARP_TABLE, "192.168.2.40").as_deref(),
            Some("dc:a6:32:00:00:40")
        );
        assert_eq!(arp_lookup(ARP_TABLE, "192.168.2.4"), None);
    }

    #[test]
    fn test_arp_lookup_skips_incomplete() {
        assert_eq!(arp_lookup(ARP_TABLE, "192.168.2.99"), None);
    }

    #[test]
    fn test_arp_lookup_ignores_header() {
        assert_eq!(arp_lookup(ARP_TABLE, "IP"), None);
    }

    #[tokio::test]
    async fn test_missing_nmap_is_reported() {
        let config = DiscoverConfig {
            nmap_path: "/nonexistent/nmap".to_string(),
            ..DiscoverConfig::default()
        };
        let scanner = NmapScanner::new(&config);
        let err = scanner.discover_live("10.0.0.0/30").await.unwrap_err();
        assert!(matches!(err, DiscoverError::ToolNotFound { .. }));
    }
}
