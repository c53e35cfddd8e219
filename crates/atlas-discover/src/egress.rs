//! Egress IP lookup against plain-text "what is my IP" endpoints.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::probe::EgressLookup;

pub struct HttpEgressLookup {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl HttpEgressLookup {
    pub fn new(config: &DiscoverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.egress_timeout())
            .user_agent(concat!("atlas/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            urls: config.egress_urls.clone(),
        })
    }
}

#[async_trait]
impl EgressLookup for HttpEgressLookup {
    /// Try each endpoint in order; the first body that is an IP wins.
    async fn public_ip(&self) -> Result<Option<String>> {
        for url in &self.urls {
            let resp = match self.client.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Egress lookup request failed");
                    continue;
                }
            };

            if !resp.status().is_success() {
                tracing::warn!(url = %url, status = %resp.status(), "Egress lookup returned error");
                continue;
            }

            match resp.text().await {
                Ok(body) => match parse_ip_body(&body) {
                    Some(ip) => return Ok(Some(ip)),
                    None => tracing::warn!(url = %url, "Egress lookup body is not an IP"),
                },
                Err(e) => tracing::warn!(url = %url, error = %e, "Egress lookup body unreadable"),
            }
        }
        Ok(None)
    }
}

/// Accept a body only if, trimmed, it is exactly one IP address.
pub fn parse_ip_body(body: &str) -> Option<String> {
    body.trim().parse::<IpAddr>().ok().map(|ip| ip.to_string())
}
