//! Capabilities the scan engine consumes.
//!
//! Each trait is backed in production by a subprocess or HTTP wrapper
//! (`scanner`, `docker`, `interfaces`, `names`, `egress`) and in tests by
//! in-process fakes. Implementations must be cheap to share across tasks.

use async_trait::async_trait;

use atlas_core::{Facts, NetworkInterface, NetworkTarget};

use crate::error::Result;

/// A host the liveness sweep reported up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveHost {
    pub address: String,
    /// Name the sweep itself surfaced (PTR), if any.
    pub name: Option<String>,
    pub mac_address: Option<String>,
}

/// Host liveness and deep probing.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Sweep a subnet for live hosts.
    async fn discover_live(&self, subnet_cidr: &str) -> Result<Vec<LiveHost>>;

    /// Full probe of one host: ports, OS guess and MAC.
    ///
    /// The returned facts carry `NO_NAME` as display name; naming is the
    /// orchestrator's job.
    async fn probe_host(&self, target: &NetworkTarget) -> Result<Facts>;
}

/// Container listing and inspection.
#[async_trait]
pub trait ContainerProbe: Send + Sync {
    /// Ids of every local container, running or stopped.
    async fn list_containers(&self) -> Result<Vec<String>>;

    /// One `Facts` per attached network, or a single placeholder with an
    /// empty address when the container has no network.
    async fn probe_container(&self, container_id: &str) -> Result<Vec<Facts>>;
}

#[async_trait]
pub trait InterfaceEnumerator: Send + Sync {
    /// Scannable interfaces, virtual and loopback ones excluded.
    async fn list_interfaces(&self) -> Result<Vec<NetworkInterface>>;

    /// The host's default gateway, if a default route exists.
    async fn default_gateway(&self) -> Result<Option<String>>;
}

/// Best-effort name lookups. Failures and timeouts read as `None`.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn reverse_dns(&self, address: &str) -> Option<String>;

    async fn netbios(&self, address: &str) -> Option<String>;
}

#[async_trait]
pub trait EgressLookup: Send + Sync {
    /// The public IP this host egresses from, or `None` if no endpoint
    /// answered with one.
    async fn public_ip(&self) -> Result<Option<String>>;
}
