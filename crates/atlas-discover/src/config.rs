//! Configuration for the Atlas discovery engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use atlas_inventory::StoreConfig;

/// Top-level discover configuration.
///
/// Loaded from `atlas.toml` `[discover]` section or `ATLAS_DISCOVER__`
/// environment variables, then patched by the legacy `SCAN_SUBNETS` and
/// `ATLAS_SCAN_INTERVAL` variables (see [`DiscoverConfig::apply_env_overrides`]).
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Path to the docker CLI (default: "docker").
    #[serde(default = "default_docker_path")]
    pub docker_path: String,

    /// Path to the iproute2 `ip` binary (default: "ip").
    #[serde(default = "default_ip_path")]
    pub ip_path: String,

    /// SQLite inventory file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Kernel ARP table consulted when a probe reports no MAC address.
    #[serde(default = "default_arp_table_path")]
    pub arp_table_path: PathBuf,

    /// Network name recorded on LAN host rows.
    #[serde(default = "default_network_name")]
    pub network_name: String,

    /// Probe profile for deep mode.
    #[serde(default)]
    pub deep_profile: ScanProfile,

    /// Subnets scanned when interface enumeration fails entirely.
    #[serde(default = "default_subnets")]
    pub default_subnets: Vec<String>,

    /// Explicit subnets to scan instead of enumerating interfaces.
    #[serde(default)]
    pub scan_subnets: Vec<String>,

    /// Interfaces whose name starts with one of these are never scanned.
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_interface_prefixes: Vec<String>,

    /// Maximum concurrent per-interface discovery sweeps.
    #[serde(default = "default_interface_concurrency")]
    pub interface_concurrency: usize,

    /// Maximum concurrent deep probes (0 = one per live host).
    #[serde(default)]
    pub deep_concurrency: usize,

    /// Maximum concurrent container inspections (0 = one per container).
    #[serde(default)]
    pub container_concurrency: usize,

    /// Maximum concurrent reverse-DNS / NetBIOS lookups.
    #[serde(default = "default_name_lookup_concurrency")]
    pub name_lookup_concurrency: usize,

    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,

    #[serde(default = "default_deep_timeout")]
    pub deep_timeout_secs: u64,

    #[serde(default = "default_inspect_timeout")]
    pub inspect_timeout_secs: u64,

    #[serde(default = "default_name_timeout")]
    pub name_timeout_secs: u64,

    #[serde(default = "default_egress_timeout")]
    pub egress_timeout_secs: u64,

    /// Plain-text "what is my IP" endpoints, tried in order.
    #[serde(default = "default_egress_urls")]
    pub egress_urls: Vec<String>,

    /// How often the scheduler re-reads its configuration row.
    #[serde(default = "default_tick_secs")]
    pub scheduler_tick_secs: u64,

    /// Interval forced into the scheduler configuration at startup.
    #[serde(default)]
    pub scan_interval_override: Option<u32>,
}

/// Predefined nmap flag sets.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanProfile {
    /// Ping sweep only: `-sn`
    Quick,
    /// Top 1000 ports with service versions: `-sV --top-ports 1000`
    Standard,
    /// All TCP ports plus OS fingerprint: `-O -p-`
    #[default]
    Deep,
}

impl ScanProfile {
    /// Return the nmap flags for this profile.
    pub fn nmap_flags(&self) -> Vec<&'static str> {
        match self {
            Self::Quick => vec!["-sn"],
            Self::Standard => vec!["-sV", "--top-ports", "1000"],
            Self::Deep => vec!["-O", "-p-"],
        }
    }
}

impl DiscoverConfig {
    /// Apply the legacy environment overrides.
    ///
    /// `SCAN_SUBNETS` is a comma-separated subnet list; `ATLAS_SCAN_INTERVAL`
    /// is a positive number of minutes. Invalid values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SCAN_SUBNETS") {
            let subnets = parse_subnet_list(&raw);
            if !subnets.is_empty() {
                tracing::info!(subnets = ?subnets, "Using SCAN_SUBNETS from environment");
                self.scan_subnets = subnets;
            }
        }

        if let Some(raw) = lookup("ATLAS_SCAN_INTERVAL") {
            match raw.trim().parse::<u32>() {
                Ok(minutes) if minutes > 0 => {
                    tracing::info!(minutes, "Using ATLAS_SCAN_INTERVAL from environment");
                    self.scan_interval_override = Some(minutes);
                }
                _ => tracing::warn!(value = %raw, "Ignoring invalid ATLAS_SCAN_INTERVAL"),
            }
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.database_path.clone(),
            ..StoreConfig::default()
        }
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn deep_timeout(&self) -> Duration {
        Duration::from_secs(self.deep_timeout_secs)
    }

    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_secs)
    }

    pub fn name_timeout(&self) -> Duration {
        Duration::from_secs(self.name_timeout_secs)
    }

    pub fn egress_timeout(&self) -> Duration {
        Duration::from_secs(self.egress_timeout_secs)
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs.max(1))
    }
}

/// Split a comma-separated subnet list, trimming and dropping empties.
pub fn parse_subnet_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_docker_path() -> String {
    "docker".to_string()
}

fn default_ip_path() -> String {
    "ip".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("/config/db/atlas.db")
}

fn default_arp_table_path() -> PathBuf {
    PathBuf::from("/proc/net/arp")
}

fn default_network_name() -> String {
    "LAN".to_string()
}

fn default_subnets() -> Vec<String> {
    vec!["192.168.2.0/24".to_string()]
}

fn default_excluded_prefixes() -> Vec<String> {
    ["docker", "br-", "veth", "lo"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_interface_concurrency() -> usize {
    4
}

fn default_name_lookup_concurrency() -> usize {
    30
}

fn default_discovery_timeout() -> u64 {
    300
}

fn default_deep_timeout() -> u64 {
    1800
}

fn default_inspect_timeout() -> u64 {
    30
}

fn default_name_timeout() -> u64 {
    3
}

fn default_egress_timeout() -> u64 {
    10
}

fn default_egress_urls() -> Vec<String> {
    vec![
        "https://ifconfig.me".to_string(),
        "https://api.ipify.org".to_string(),
    ]
}

fn default_tick_secs() -> u64 {
    60
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            docker_path: default_docker_path(),
            ip_path: default_ip_path(),
            database_path: default_database_path(),
            arp_table_path: default_arp_table_path(),
            network_name: default_network_name(),
            deep_profile: ScanProfile::default(),
            default_subnets: default_subnets(),
            scan_subnets: Vec::new(),
            excluded_interface_prefixes: default_excluded_prefixes(),
            interface_concurrency: default_interface_concurrency(),
            deep_concurrency: 0,
            container_concurrency: 0,
            name_lookup_concurrency: default_name_lookup_concurrency(),
            discovery_timeout_secs: default_discovery_timeout(),
            deep_timeout_secs: default_deep_timeout(),
            inspect_timeout_secs: default_inspect_timeout(),
            name_timeout_secs: default_name_timeout(),
            egress_timeout_secs: default_egress_timeout(),
            egress_urls: default_egress_urls(),
            scheduler_tick_secs: default_tick_secs(),
            scan_interval_override: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_scan_profile_flags() {
        assert_eq!(ScanProfile::Quick.nmap_flags(), vec!["-sn"]);
        assert_eq!(
            ScanProfile::Standard.nmap_flags(),
            vec!["-sV", "--top-ports", "1000"]
        );
        assert_eq!(ScanProfile::Deep.nmap_flags(), vec!["-O", "-p-"]);
    }

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.nmap_path, "nmap");
        assert_eq!(config.deep_profile, ScanProfile::Deep);
        assert_eq!(config.network_name, "LAN");
        assert_eq!(config.name_lookup_concurrency, 30);
        assert_eq!(config.deep_concurrency, 0);
        assert!(config.scan_subnets.is_empty());
        assert_eq!(config.default_subnets, vec!["192.168.2.0/24"]);
    }

    #[test]
    fn test_parse_subnet_list() {
        assert_eq!(
            parse_subnet_list(" 192.168.1.0/24, ,10.0.0.0/24,"),
            vec!["192.168.1.0/24", "10.0.0.0/24"]
        );
        assert!(parse_subnet_list(" , ").is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SCAN_SUBNETS", "10.1.0.0/16,10.2.0.0/16"),
            ("ATLAS_SCAN_INTERVAL", "15"),
        ]);
        let mut config = DiscoverConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.scan_subnets, vec!["10.1.0.0/16", "10.2.0.0/16"]);
        assert_eq!(config.scan_interval_override, Some(15));
    }

    #[test]
    fn test_invalid_interval_override_is_ignored() {
        for raw in ["0", "-5", "soon"] {
            let mut config = DiscoverConfig::default();
            config.apply_env_overrides(|key| {
                (key == "ATLAS_SCAN_INTERVAL").then(|| raw.to_string())
            });
            assert_eq!(config.scan_interval_override, None);
        }
    }
}
