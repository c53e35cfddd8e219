//! Local interface enumeration via iproute2.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ipnet::Ipv4Net;

use atlas_core::NetworkInterface;

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::probe::InterfaceEnumerator;
use crate::process::run_tool;

/// Prefix assumed when `ip` prints an address without one.
const FALLBACK_PREFIX: u8 = 24;

pub struct SystemInterfaces {
    ip_path: String,
    excluded_prefixes: Vec<String>,
    timeout: Duration,
}

impl SystemInterfaces {
    pub fn new(config: &DiscoverConfig) -> Self {
        Self {
            ip_path: config.ip_path.clone(),
            excluded_prefixes: config.excluded_interface_prefixes.clone(),
            // Local command: reuse the name-lookup timeout, floored at 5s.
            timeout: config.name_timeout().max(Duration::from_secs(5)),
        }
    }
}

#[async_trait]
impl InterfaceEnumerator for SystemInterfaces {
    async fn list_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let out = run_tool(
            "ip",
            &self.ip_path,
            &["-o", "-f", "inet", "addr", "show"],
            "interfaces",
            self.timeout,
        )
        .await?;

        let interfaces = parse_ip_addr(&String::from_utf8_lossy(&out), &self.excluded_prefixes);
        if interfaces.is_empty() {
            return Err(DiscoverError::NoInterfaces(
                "no non-loopback IPv4 interfaces found".to_string(),
            ));
        }
        Ok(interfaces)
    }

    async fn default_gateway(&self) -> Result<Option<String>> {
        let out = run_tool("ip", &self.ip_path, &["route"], "default route", self.timeout).await?;
        Ok(parse_default_gateway(&String::from_utf8_lossy(&out)))
    }
}

/// Parse `ip -o -f inet addr show` output.
///
/// Interfaces whose name starts with an excluded prefix and loopback
/// addresses are skipped; each address is reduced to its network.
pub fn parse_ip_addr(output: &str, excluded_prefixes: &[String]) -> Vec<NetworkInterface> {
    let mut seen = HashSet::new();
    let mut interfaces = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        // "eth0@if12:" for veth-style pairs
        let name = fields[1].trim_end_matches(':');
        let name = name.split('@').next().unwrap_or(name);
        if excluded_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            continue;
        }

        let Some(cidr) = fields
            .iter()
            .position(|f| *f == "inet")
            .and_then(|i| fields.get(i + 1))
        else {
            continue;
        };

        let Some(net) = parse_ipv4_cidr(cidr) else {
            tracing::debug!(interface = %name, value = %cidr, "Skipping unparseable address");
            continue;
        };
        if net.addr().is_loopback() {
            continue;
        }

        let subnet = net.trunc().to_string();
        if seen.insert((name.to_string(), subnet.clone())) {
            interfaces.push(NetworkInterface {
                name: name.to_string(),
                subnet_cidr: subnet,
                address: Some(net.addr().to_string()),
            });
        }
    }

    interfaces
}

fn parse_ipv4_cidr(value: &str) -> Option<Ipv4Net> {
    if value.contains('/') {
        value.parse().ok()
    } else {
        Ipv4Net::new(value.parse().ok()?, FALLBACK_PREFIX).ok()
    }
}

/// Extract `X` from the first `default via X ...` route.
pub fn parse_default_gateway(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.starts_with("default"))
        .find_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            fields
                .iter()
                .position(|f| *f == "via")
                .and_then(|i| fields.get(i + 1))
                .map(|gw| gw.to_string())
        })
}
