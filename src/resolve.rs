use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Host name to address, best effort.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// System resolver via `tokio::net::lookup_host`, bounded by a timeout.
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, 80))).await {
            Ok(Ok(addrs)) => prefer_ipv4(addrs.map(|a| a.ip())),
            Ok(Err(e)) => {
                debug!("Lookup failed for {}: {}", host, e);
                None
            }
            Err(_) => {
                debug!("Lookup timed out for {} after {:?}", host, self.timeout);
                None
            }
        }
    }
}

/// First IPv4 address, else the first address of any family.
pub fn prefer_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

/// Fixed host table for tests.
#[cfg(test)]
pub struct StaticResolver(std::collections::HashMap<String, IpAddr>);

#[cfg(test)]
impl StaticResolver {
    pub fn new(entries: &[(&str, IpAddr)]) -> Self {
        Self(entries.iter().map(|(h, ip)| (h.to_string(), *ip)).collect())
    }
}

#[cfg(test)]
#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        self.0.get(host).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn ipv4_is_preferred() {
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::new(152, 3, 72, 104));
        assert_eq!(prefer_ipv4([v6, v4]), Some(v4));
        assert_eq!(prefer_ipv4([v6]), Some(v6));
        assert_eq!(prefer_ipv4(Vec::new()), None);
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let resolver = DnsResolver::new(Duration::from_secs(5));
        let ip = resolver.resolve("localhost").await;
        assert!(ip.map(|ip| ip.is_loopback()).unwrap_or(false));
    }

    #[tokio::test]
    async fn reserved_name_does_not_resolve() {
        let resolver = DnsResolver::new(Duration::from_secs(5));
        assert_eq!(resolver.resolve("edumap.invalid").await, None);
    }
}
