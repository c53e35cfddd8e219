//! Scan modes: fast liveness sweep, deep port/OS sweep, container sweep.
//!
//! Each mode is interface enumeration (or container listing), one or two
//! fan-outs, then reconciliation. Per-target failures never fail a mode;
//! only setup errors (store, interfaces) and a failed container listing do.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use atlas_core::{Facts, InventoryDomain, NetworkInterface, NetworkTarget, Scope};
use atlas_inventory::InventoryStore;

use crate::config::DiscoverConfig;
use crate::docker::DockerInspector;
use crate::egress::HttpEgressLookup;
use crate::error::{DiscoverError, Result};
use crate::fanout::fan_out;
use crate::interfaces::SystemInterfaces;
use crate::names::{resolve_name, SystemNameResolver};
use crate::probe::{
    ContainerProbe, EgressLookup, HostProbe, InterfaceEnumerator, LiveHost, NameResolver,
};
use crate::reconcile::{reconcile, ReconcileSummary};
use crate::scanner::NmapScanner;

/// Headroom a fan-out grants on top of a probe's own tool timeout.
const PROBE_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Fast,
    Deep,
    Container,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::Deep => "deep",
            Self::Container => "container",
        })
    }
}

/// Summary of one scan-mode run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub mode: ScanMode,
    /// Interfaces swept (host modes) or containers listed.
    pub targets: usize,
    pub facts: usize,
    pub probe_failures: usize,
    pub marked_offline: u64,
    pub upserted: usize,
    pub upsert_failures: usize,
    pub deleted: u64,
    pub egress_ip: Option<String>,
    pub duration_ms: u128,
}

impl ScanReport {
    fn new(scan_id: Uuid, mode: ScanMode) -> Self {
        Self {
            scan_id,
            mode,
            targets: 0,
            facts: 0,
            probe_failures: 0,
            marked_offline: 0,
            upserted: 0,
            upsert_failures: 0,
            deleted: 0,
            egress_ip: None,
            duration_ms: 0,
        }
    }

    fn record(&mut self, summary: &ReconcileSummary) {
        self.marked_offline = summary.marked_offline;
        self.upserted = summary.upserted;
        self.upsert_failures = summary.failed;
        self.deleted = summary.deleted;
    }
}

/// The capabilities a scan needs.
#[derive(Clone)]
pub struct Probes {
    pub hosts: Arc<dyn HostProbe>,
    pub containers: Arc<dyn ContainerProbe>,
    pub interfaces: Arc<dyn InterfaceEnumerator>,
    pub names: Arc<dyn NameResolver>,
    pub egress: Arc<dyn EgressLookup>,
}

impl Probes {
    /// Subprocess- and HTTP-backed probes for the local system.
    pub fn system(config: &DiscoverConfig) -> Result<Self> {
        Ok(Self {
            hosts: Arc::new(NmapScanner::new(config)),
            containers: Arc::new(DockerInspector::new(config)),
            interfaces: Arc::new(SystemInterfaces::new(config)),
            names: Arc::new(SystemNameResolver::new(config)),
            egress: Arc::new(HttpEgressLookup::new(config)?),
        })
    }
}

pub struct ScanOrchestrator {
    store: InventoryStore,
    probes: Probes,
    config: Arc<DiscoverConfig>,
}

impl ScanOrchestrator {
    pub fn new(store: InventoryStore, probes: Probes, config: Arc<DiscoverConfig>) -> Self {
        Self {
            store,
            probes,
            config,
        }
    }

    pub fn store(&self) -> &InventoryStore {
        &self.store
    }

    pub async fn run_mode(&self, mode: ScanMode) -> Result<ScanReport> {
        match mode {
            ScanMode::Fast => self.fast_scan().await,
            ScanMode::Deep => self.deep_scan().await,
            ScanMode::Container => self.container_scan().await,
        }
    }

    /// Liveness sweep per interface, each reconciled within that interface,
    /// followed by the egress-IP observation.
    pub async fn fast_scan(&self) -> Result<ScanReport> {
        let start = Instant::now();
        let mut report = ScanReport::new(Uuid::new_v4(), ScanMode::Fast);
        tracing::info!(scan_id = %report.scan_id, mode = %report.mode, "Scan started");

        let interfaces = self.resolve_interfaces().await?;
        report.targets = interfaces.len();
        let gateway = self.default_gateway().await;

        let (sweeps, failed) = self.discover(interfaces).await;
        report.probe_failures += failed;

        let mut totals = ReconcileSummary::default();
        for (iface, live) in sweeps {
            let targets: Vec<(NetworkTarget, Option<String>)> = live
                .into_iter()
                .map(|host| (to_target(&iface, &host), host.mac_address))
                .collect();
            let names = self.resolve_names(targets.iter().map(|(t, _)| t.clone()).collect()).await;

            let facts: Vec<Facts> = targets
                .into_iter()
                .zip(names)
                .map(|((target, mac_address), display_name)| Facts {
                    display_name,
                    mac_address,
                    next_hop: gateway.clone(),
                    ..Facts::host(&target.address, &target.interface_name, &self.config.network_name)
                })
                .collect();
            report.facts += facts.len();

            let summary = reconcile(
                &self.store,
                InventoryDomain::LanHosts,
                &Scope::Interface(iface.name.clone()),
                &facts,
            )
            .await?;
            totals.absorb(&summary);
        }
        report.record(&totals);

        report.egress_ip = self.record_egress().await;
        self.finish(report, start)
    }

    /// Liveness sweep, then a full probe of every live host, reconciled
    /// against the whole LAN table. When some sweeps failed, only the
    /// interfaces that swept are reconciled.
    pub async fn deep_scan(&self) -> Result<ScanReport> {
        let start = Instant::now();
        let mut report = ScanReport::new(Uuid::new_v4(), ScanMode::Deep);
        tracing::info!(scan_id = %report.scan_id, mode = %report.mode, "Scan started");

        let interfaces = self.resolve_interfaces().await?;
        report.targets = interfaces.len();

        let (sweeps, failed) = self.discover(interfaces).await;
        report.probe_failures += failed;
        if sweeps.is_empty() {
            tracing::warn!(
                scan_id = %report.scan_id,
                "Every discovery sweep failed, leaving the inventory untouched"
            );
            return self.finish(report, start);
        }

        let scope = if failed == 0 {
            Scope::All
        } else {
            Scope::Interfaces(sweeps.iter().map(|(iface, _)| iface.name.clone()).collect())
        };

        let targets: Vec<DeepTarget> = sweeps
            .iter()
            .flat_map(|(iface, live)| {
                live.iter().map(|host| DeepTarget {
                    target: to_target(iface, host),
                    mac_address: host.mac_address.clone(),
                })
            })
            .collect();

        let hosts = self.probes.hosts.clone();
        let names = self.probes.names.clone();
        let network = self.config.network_name.clone();
        let limit = self.config.deep_timeout() + self.config.name_timeout() * 2 + PROBE_SLACK;

        let probed = fan_out(
            "deep-probe",
            targets,
            self.config.deep_concurrency,
            Some(limit),
            |item: DeepTarget| {
                let hosts = hosts.clone();
                let names = names.clone();
                let network = network.clone();
                async move { Ok(deep_probe(&*hosts, &*names, &network, item).await) }
            },
        )
        .await;
        report.probe_failures += probed.failures.len();
        report.facts = probed.results.len();

        let summary = reconcile(
            &self.store,
            InventoryDomain::LanHosts,
            &scope,
            &probed.results,
        )
        .await?;
        report.record(&summary);

        self.finish(report, start)
    }

    /// Inspect every container, reconcile with deletion of vanished rows.
    pub async fn container_scan(&self) -> Result<ScanReport> {
        let start = Instant::now();
        let mut report = ScanReport::new(Uuid::new_v4(), ScanMode::Container);
        tracing::info!(scan_id = %report.scan_id, mode = %report.mode, "Scan started");

        let ids = self.probes.containers.list_containers().await?;
        report.targets = ids.len();

        let containers = self.probes.containers.clone();
        let limit = self.config.inspect_timeout() * 2 + PROBE_SLACK;
        let inspected = fan_out(
            "container-inspect",
            ids,
            self.config.container_concurrency,
            Some(limit),
            |id: String| {
                let containers = containers.clone();
                async move { containers.probe_container(&id).await }
            },
        )
        .await;

        // A failed inspection must not read as "container gone".
        let retained: Vec<String> = inspected.failures.iter().map(|f| f.target.clone()).collect();
        report.probe_failures = retained.len();

        let facts: Vec<Facts> = inspected.results.into_iter().flatten().collect();
        report.facts = facts.len();

        let summary = reconcile(
            &self.store,
            InventoryDomain::ContainerHosts,
            &Scope::AllExcept(retained),
            &facts,
        )
        .await?;
        report.record(&summary);

        self.finish(report, start)
    }

    /// Interfaces to sweep: the subnet override list, else enumeration,
    /// else the configured default subnets.
    async fn resolve_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let enumerated = self.probes.interfaces.list_interfaces().await;

        if !self.config.scan_subnets.is_empty() {
            let known = enumerated.unwrap_or_default();
            return Ok(self
                .config
                .scan_subnets
                .iter()
                .map(|subnet| {
                    known
                        .iter()
                        .find(|iface| &iface.subnet_cidr == subnet)
                        .cloned()
                        .unwrap_or_else(|| subnet_only(subnet))
                })
                .collect());
        }

        match enumerated {
            Ok(interfaces) if !interfaces.is_empty() => Ok(interfaces),
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => "no interfaces".to_string(),
                };
                if self.config.default_subnets.is_empty() {
                    return Err(DiscoverError::NoInterfaces(reason));
                }
                tracing::warn!(
                    error = %reason,
                    subnets = ?self.config.default_subnets,
                    "Interface enumeration failed, using default subnets"
                );
                Ok(self.config.default_subnets.iter().map(|s| subnet_only(s)).collect())
            }
        }
    }

    async fn default_gateway(&self) -> Option<String> {
        match self.probes.interfaces.default_gateway().await {
            Ok(Some(gateway)) => Some(gateway),
            Ok(None) => {
                tracing::warn!("No default gateway found");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not determine default gateway");
                None
            }
        }
    }

    /// Liveness sweep of every interface. Failed sweeps are dropped so their
    /// interface is not reconciled this pass.
    async fn discover(
        &self,
        interfaces: Vec<NetworkInterface>,
    ) -> (Vec<(NetworkInterface, Vec<LiveHost>)>, usize) {
        let hosts = self.probes.hosts.clone();
        let limit = self.config.discovery_timeout() + PROBE_SLACK;

        let report = fan_out(
            "discovery",
            interfaces,
            self.config.interface_concurrency,
            Some(limit),
            |iface: NetworkInterface| {
                let hosts = hosts.clone();
                async move {
                    let live = hosts.discover_live(&iface.subnet_cidr).await?;
                    tracing::info!(interface = %iface.name, subnet = %iface.subnet_cidr, live = live.len(), "Discovered hosts");
                    Ok((iface, live))
                }
            },
        )
        .await;

        (report.results, report.failures.len())
    }

    /// Display names for `targets`, in the same order.
    async fn resolve_names(&self, targets: Vec<NetworkTarget>) -> Vec<String> {
        let names = self.probes.names.clone();
        let limit = self.config.name_timeout() * 2 + PROBE_SLACK;
        let order: Vec<String> = targets.iter().map(|t| t.address.clone()).collect();

        let resolved = fan_out(
            "name-lookup",
            targets,
            self.config.name_lookup_concurrency,
            Some(limit),
            |target: NetworkTarget| {
                let names = names.clone();
                async move {
                    let name =
                        resolve_name(&*names, &target.address, target.discovered_name.as_deref())
                            .await;
                    Ok((target.address, name))
                }
            },
        )
        .await;

        let by_address: std::collections::HashMap<String, String> =
            resolved.results.into_iter().collect();
        order
            .iter()
            .map(|address| {
                by_address
                    .get(address)
                    .cloned()
                    .unwrap_or_else(|| atlas_core::types::NO_NAME.to_string())
            })
            .collect()
    }

    async fn record_egress(&self) -> Option<String> {
        let ip = match self.probes.egress.public_ip().await {
            Ok(Some(ip)) => ip,
            Ok(None) => {
                tracing::warn!("Could not determine external IP");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "External IP lookup failed");
                return None;
            }
        };

        if let Err(e) = self
            .store
            .upsert_external_network(&ip, None, None, Utc::now())
            .await
        {
            tracing::warn!(public_ip = %ip, error = %e, "Recording external IP failed");
        } else {
            tracing::info!(public_ip = %ip, "External IP recorded");
        }
        Some(ip)
    }

    fn finish(&self, mut report: ScanReport, start: Instant) -> Result<ScanReport> {
        report.duration_ms = start.elapsed().as_millis();
        tracing::info!(
            scan_id = %report.scan_id,
            mode = %report.mode,
            targets = report.targets,
            facts = report.facts,
            probe_failures = report.probe_failures,
            upserted = report.upserted,
            marked_offline = report.marked_offline,
            deleted = report.deleted,
            duration_ms = report.duration_ms,
            "Scan complete"
        );
        Ok(report)
    }
}

/// A live host queued for the deep probe.
struct DeepTarget {
    target: NetworkTarget,
    mac_address: Option<String>,
}

impl fmt::Display for DeepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.target, f)
    }
}

/// Full probe plus naming for one live host.
///
/// A failed probe degrades to liveness-only facts: the sweep already
/// confirmed the host is up.
async fn deep_probe(
    hosts: &dyn HostProbe,
    names: &dyn NameResolver,
    network: &str,
    item: DeepTarget,
) -> Facts {
    let DeepTarget {
        target,
        mac_address,
    } = item;

    let mut facts = match hosts.probe_host(&target).await {
        Ok(facts) => facts,
        Err(e) => {
            tracing::warn!(target = %target, error = %e, "Deep probe failed, keeping liveness only");
            Facts::host(&target.address, &target.interface_name, network)
        }
    };

    facts.display_name =
        resolve_name(names, &target.address, target.discovered_name.as_deref()).await;
    if facts.mac_address.is_none() {
        facts.mac_address = mac_address;
    }
    facts
}

fn to_target(iface: &NetworkInterface, host: &LiveHost) -> NetworkTarget {
    NetworkTarget {
        address: host.address.clone(),
        interface_name: iface.name.clone(),
        subnet_cidr: iface.subnet_cidr.clone(),
        discovered_name: host.name.clone(),
    }
}

/// A subnet with no matching local interface is tracked under its own CIDR.
fn subnet_only(subnet: &str) -> NetworkInterface {
    NetworkInterface {
        name: subnet.to_string(),
        subnet_cidr: subnet.to_string(),
        address: None,
    }
}
