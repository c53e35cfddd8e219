//! Host naming: the resolution policy and the system-backed resolver.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;

use atlas_core::types::{NO_NAME, UNKNOWN};

use crate::config::DiscoverConfig;
use crate::probe::NameResolver;
use crate::process::run_tool;

/// Pick a display name for `address`.
///
/// The discovery probe's own name wins, then reverse DNS, then NetBIOS.
/// Lookups run only as far as needed. Nothing usable yields `NO_NAME`.
pub async fn resolve_name(
    resolver: &dyn NameResolver,
    address: &str,
    discovered: Option<&str>,
) -> String {
    if let Some(name) = usable_name(discovered, address) {
        return name;
    }
    if let Some(name) = usable_name(resolver.reverse_dns(address).await.as_deref(), address) {
        return name;
    }
    if let Some(name) = usable_name(resolver.netbios(address).await.as_deref(), address) {
        return name;
    }
    NO_NAME.to_string()
}

/// Normalize a candidate name; sentinels, blanks and echoes of the address
/// are not names.
fn usable_name(candidate: Option<&str>, address: &str) -> Option<String> {
    let name = candidate?.trim().trim_end_matches('.');
    if name.is_empty() || name == NO_NAME || name == UNKNOWN || name == address {
        return None;
    }
    Some(name.to_string())
}

/// Resolves PTR records through the system's DNS configuration and
/// NetBIOS names with `nmblookup -A`.
pub struct SystemNameResolver {
    dns: Option<TokioAsyncResolver>,
    timeout: Duration,
}

impl SystemNameResolver {
    pub fn new(config: &DiscoverConfig) -> Self {
        let timeout = config.name_timeout();
        let dns = match read_system_conf() {
            Ok((resolver_config, mut opts)) => {
                opts.timeout = timeout;
                opts.attempts = 1;
                Some(TokioAsyncResolver::tokio(resolver_config, opts))
            }
            Err(e) => {
                tracing::warn!(error = %e, "No system DNS configuration, reverse lookups disabled");
                None
            }
        };
        Self { dns, timeout }
    }
}

#[async_trait]
impl NameResolver for SystemNameResolver {
    async fn reverse_dns(&self, address: &str) -> Option<String> {
        let ip: IpAddr = address.parse().ok()?;
        let resolver = self.dns.as_ref()?;

        match tokio::time::timeout(self.timeout, resolver.reverse_lookup(ip)).await {
            Ok(Ok(lookup)) => lookup.iter().next().map(|name| name.to_string()),
            Ok(Err(e)) => {
                tracing::debug!(address = %address, error = %e, "Reverse DNS lookup failed");
                None
            }
            Err(_) => {
                tracing::debug!(address = %address, "Reverse DNS lookup timed out");
                None
            }
        }
    }

    async fn netbios(&self, address: &str) -> Option<String> {
        match run_tool("nmblookup", "nmblookup", &["-A", address], address, self.timeout).await {
            Ok(out) => parse_nmblookup(&String::from_utf8_lossy(&out)),
            Err(e) => {
                tracing::debug!(address = %address, error = %e, "NetBIOS lookup failed");
                None
            }
        }
    }
}

/// First unique `<00>` workstation record of a node status reply.
pub fn parse_nmblookup(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.contains("<00>") && !line.contains("<GROUP>"))
        .find_map(|line| line.split_whitespace().next())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FakeResolver {
        dns: Option<&'static str>,
        netbios: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeResolver {
        fn new(dns: Option<&'static str>, netbios: Option<&'static str>) -> Self {
            Self {
                dns,
                netbios,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NameResolver for FakeResolver {
        async fn reverse_dns(&self, _address: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.dns.map(String::from)
        }

        async fn netbios(&self, _address: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.netbios.map(String::from)
        }
    }

    #[tokio::test]
    async fn test_discovered_name_wins_without_lookups() {
        let resolver = FakeResolver::new(Some("dns.lan"), Some("NBNAME"));
        let name = resolve_name(&resolver, "10.0.0.5", Some("nas.lan.")).await;
        assert_eq!(name, "nas.lan");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_sentinels_to_netbios() {
        let resolver = FakeResolver::new(Some("  "), Some("OFFICE-PC"));
        let name = resolve_name(&resolver, "10.0.0.5", Some(NO_NAME)).await;
        assert_eq!(name, "OFFICE-PC");
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_address_echo_is_not_a_name() {
        let resolver = FakeResolver::new(Some("10.0.0.5"), None);
        assert_eq!(resolve_name(&resolver, "10.0.0.5", None).await, NO_NAME);
    }

    #[tokio::test]
    async fn test_reverse_dns_skips_non_addresses() {
        let resolver = SystemNameResolver::new(&DiscoverConfig::default());
        assert_eq!(resolver.reverse_dns("not-an-address").await, None);
    }

    #[test]
    fn test_parse_nmblookup() {
        let out = "\
Looking up status of 192.168.2.30
\tWORKGROUP       <00> - <GROUP> B <ACTIVE>
\tOFFICE-PC       <00> -         B <ACTIVE>
\tOFFICE-PC       <20> -         B <ACTIVE>

\tMAC Address = 00-00-00-00-00-00
";
        assert_eq!(parse_nmblookup(out).as_deref(), Some("OFFICE-PC"));
        assert_eq!(parse_nmblookup("No reply from 192.168.2.31\n"), None);
    }
}
