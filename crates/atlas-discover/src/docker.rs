//! Docker-backed container probe.
//!
//! Lists containers with `docker ps -a -q --no-trunc`, reads each one with
//! `docker inspect` and maps every attached network to a `Facts` record.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use atlas_core::Facts;

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::probe::ContainerProbe;
use crate::process::run_tool;

/// The subset of `docker inspect` output the inventory uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub state: ContainerState,
    pub config: ContainerConfig,
    pub network_settings: NetworkSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    /// `"80/tcp" -> bindings`; `null` bindings mean the port is not published.
    #[serde(default)]
    pub ports: Option<BTreeMap<String, Option<Vec<PortBinding>>>>,
    #[serde(default)]
    pub networks: Option<BTreeMap<String, Endpoint>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
    #[serde(rename = "Gateway", default)]
    pub gateway: String,
    #[serde(rename = "MacAddress", default)]
    pub mac_address: String,
}

impl ContainerInspect {
    pub fn display_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    /// Published ports as `"80/tcp -> 0.0.0.0:8080"`, the rest as
    /// `"80/tcp (internal)"`, sorted.
    pub fn rendered_ports(&self) -> Vec<String> {
        let mut rendered: Vec<String> = self
            .network_settings
            .ports
            .iter()
            .flatten()
            .map(|(port, bindings)| {
                match bindings.as_deref().and_then(|b| b.first()) {
                    Some(b) if !b.host_port.is_empty() => {
                        format!("{port} -> {}:{}", b.host_ip, b.host_port)
                    }
                    _ => format!("{port} (internal)"),
                }
            })
            .collect();
        rendered.sort();
        rendered
    }
}

/// Map one inspected container to its per-network facts.
///
/// A container attached to no network yields a single placeholder record
/// with an empty address and network name.
pub fn container_facts(inspect: &ContainerInspect, image_os: Option<&str>) -> Vec<Facts> {
    let base = Facts {
        display_name: inspect.display_name().to_string(),
        os_details: image_os.map(String::from),
        open_ports: Some(inspect.rendered_ports()),
        ..Facts::container(&inspect.id, &inspect.state.status, "")
    };

    let networks = match &inspect.network_settings.networks {
        Some(networks) if !networks.is_empty() => networks,
        _ => return vec![base],
    };

    networks
        .iter()
        .map(|(network, endpoint)| Facts {
            address: endpoint.ip_address.clone(),
            mac_address: non_empty(&endpoint.mac_address),
            next_hop: non_empty(&endpoint.gateway),
            network_name: network.clone(),
            ..base.clone()
        })
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Wrapper around the docker CLI.
pub struct DockerInspector {
    docker_path: String,
    timeout: Duration,
}

impl DockerInspector {
    pub fn new(config: &DiscoverConfig) -> Self {
        Self {
            docker_path: config.docker_path.clone(),
            timeout: config.inspect_timeout(),
        }
    }

    async fn docker(&self, args: &[&str], target: &str) -> Result<Vec<u8>> {
        run_tool("docker", &self.docker_path, args, target, self.timeout).await
    }

    async fn image_os(&self, image: &str) -> Option<String> {
        if image.is_empty() {
            return None;
        }
        match self
            .docker(&["image", "inspect", "--format", "{{.Os}}", image], image)
            .await
        {
            Ok(out) => non_empty(String::from_utf8_lossy(&out).trim()),
            Err(e) => {
                tracing::debug!(image = %image, error = %e, "Image OS lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ContainerProbe for DockerInspector {
    async fn list_containers(&self) -> Result<Vec<String>> {
        let out = self
            .docker(&["ps", "-a", "-q", "--no-trunc"], "containers")
            .await?;
        Ok(String::from_utf8_lossy(&out)
            .split_whitespace()
            .map(String::from)
            .collect())
    }

    async fn probe_container(&self, container_id: &str) -> Result<Vec<Facts>> {
        let out = self.docker(&["inspect", container_id], container_id).await?;
        let inspect = serde_json::from_slice::<Vec<ContainerInspect>>(&out)?
            .into_iter()
            .next()
            .ok_or_else(|| DiscoverError::MissingFromOutput {
                tool: "docker".to_string(),
                target: container_id.to_string(),
            })?;

        let os = self.image_os(&inspect.config.image).await;
        Ok(container_facts(&inspect, os.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use atlas_core::OnlineStatus;

    use super::*;

    const INSPECT_JSON: &str = r#"[{
        "Id": "4f1c0d2e9a",
        "Name": "/pihole",
        "State": {"Status": "running", "Running": true},
        "Config": {"Image": "pihole/pihole:latest"},
        "NetworkSettings": {
            "Ports": {
                "80/tcp": [{"HostIp": "0.0.0.0", "HostPort": "8080"}],
                "53/udp": null,
                "443/tcp": []
            },
            "Networks": {
                "frontend": {"IPAddress": "172.20.0.3", "Gateway": "172.20.0.1", "MacAddress": "02:42:ac:14:00:03"},
                "backend": {"IPAddress": "172.21.0.2", "Gateway": "172.21.0.1", "MacAddress": ""}
            }
        }
    }]"#;

    fn parse(json: &str) -> ContainerInspect {
        serde_json::from_str::<Vec<ContainerInspect>>(json)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_one_fact_per_network() {
        let facts = container_facts(&parse(INSPECT_JSON), Some("linux"));
        assert_eq!(facts.len(), 2);

        // BTreeMap order: backend before frontend.
        let backend = &facts[0];
        assert_eq!(backend.network_name, "backend");
        assert_eq!(backend.address, "172.21.0.2");
        assert_eq!(backend.mac_address, None);
        assert_eq!(backend.next_hop.as_deref(), Some("172.21.0.1"));

        let frontend = &facts[1];
        assert_eq!(frontend.display_name, "pihole");
        assert_eq!(frontend.container_id.as_deref(), Some("4f1c0d2e9a"));
        assert_eq!(frontend.os_details.as_deref(), Some("linux"));
        assert_eq!(frontend.mac_address.as_deref(), Some("02:42:ac:14:00:03"));
        assert_eq!(frontend.observed_status(), OnlineStatus::Online);
    }

    #[test]
    fn test_port_rendering() {
        let inspect = parse(INSPECT_JSON);
        assert_eq!(
            inspect.rendered_ports(),
            vec![
                "443/tcp (internal)",
                "53/udp (internal)",
                "80/tcp -> 0.0.0.0:8080",
            ]
        );
    }

    #[test]
    fn test_container_without_network_yields_placeholder() {
        let json = r#"[{
            "Id": "deadbeef",
            "Name": "/batch-job",
            "State": {"Status": "exited"},
            "Config": {"Image": ""},
            "NetworkSettings": {"Ports": null, "Networks": {}}
        }]"#;
        let facts = container_facts(&parse(json), None);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].address, "");
        assert_eq!(facts[0].network_name, "");
        assert_eq!(facts[0].open_ports, Some(vec![]));
        assert_eq!(facts[0].observed_status(), OnlineStatus::Offline);
    }
}
