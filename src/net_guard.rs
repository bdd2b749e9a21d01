//! SSRF-prevention predicate (spec.md §6). Listed as an "external contract"
//! in spec.md §1, but the rejection rules are specified precisely enough
//! that this crate ships a concrete implementation; an embedding application
//! may substitute its own via the `NetGuard` trait.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::lookup_host;

use crate::error::NetGuardError;

#[async_trait]
pub trait NetGuard: Send + Sync {
    /// Rejects loopback, RFC1918, RFC6598 CGNAT, link-local, `0.0.0.0/8`,
    /// multicast, IPv6 unique-local/loopback/link-local/multicast, and the
    /// literal hostname `localhost`. Rejects when ANY resolved address
    /// belongs to those ranges.
    async fn validate_url(&self, url: &str) -> Result<(), NetGuardError>;

    /// Same checks performed at connect time, for defense in depth in
    /// `PlainFetcher`.
    fn validate_dial_addr(&self, addr: &SocketAddr) -> Result<(), NetGuardError>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultNetGuard;

impl DefaultNetGuard {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetGuard for DefaultNetGuard {
    async fn validate_url(&self, url: &str) -> Result<(), NetGuardError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| NetGuardError(format!("invalid url: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| NetGuardError("url has no host".to_string()))?;

        if host.eq_ignore_ascii_case("localhost") {
            return Err(NetGuardError("host is localhost".to_string()));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return check_ip(ip);
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let resolved = lookup_host((host, port))
            .await
            .map_err(|e| NetGuardError(format!("dns resolution failed: {e}")))?;

        for addr in resolved {
            check_ip(addr.ip())?;
        }
        Ok(())
    }

    fn validate_dial_addr(&self, addr: &SocketAddr) -> Result<(), NetGuardError> {
        check_ip(addr.ip())
    }
}

fn check_ip(ip: IpAddr) -> Result<(), NetGuardError> {
    match ip {
        IpAddr::V4(v4) => check_ipv4(v4),
        IpAddr::V6(v6) => check_ipv6(v6),
    }
}

fn check_ipv4(ip: Ipv4Addr) -> Result<(), NetGuardError> {
    if ip.is_loopback() {
        return Err(NetGuardError("loopback address".to_string()));
    }
    if ip.is_private() {
        return Err(NetGuardError("RFC1918 private address".to_string()));
    }
    if is_cgnat(ip) {
        return Err(NetGuardError("RFC6598 CGNAT address".to_string()));
    }
    if ip.is_link_local() {
        return Err(NetGuardError("link-local address".to_string()));
    }
    if ip.octets()[0] == 0 {
        return Err(NetGuardError("0.0.0.0/8 address".to_string()));
    }
    if ip.is_multicast() {
        return Err(NetGuardError("multicast address".to_string()));
    }
    Ok(())
}

/// RFC6598: 100.64.0.0/10
fn is_cgnat(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000
}

fn check_ipv6(ip: Ipv6Addr) -> Result<(), NetGuardError> {
    if ip.is_loopback() {
        return Err(NetGuardError("IPv6 loopback address".to_string()));
    }
    if is_unique_local(ip) {
        return Err(NetGuardError("IPv6 unique-local address".to_string()));
    }
    if is_ipv6_link_local(ip) {
        return Err(NetGuardError("IPv6 link-local address".to_string()));
    }
    if ip.is_multicast() {
        return Err(NetGuardError("IPv6 multicast address".to_string()));
    }
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return check_ipv4(mapped);
    }
    Ok(())
}

/// fc00::/7
fn is_unique_local(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

/// fe80::/10
fn is_ipv6_link_local(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback_v4() {
        assert!(check_ipv4(Ipv4Addr::new(127, 0, 0, 1)).is_err());
    }

    #[test]
    fn rejects_rfc1918() {
        assert!(check_ipv4(Ipv4Addr::new(192, 168, 1, 1)).is_err());
        assert!(check_ipv4(Ipv4Addr::new(10, 0, 0, 1)).is_err());
        assert!(check_ipv4(Ipv4Addr::new(172, 16, 0, 1)).is_err());
    }

    #[test]
    fn rejects_cgnat() {
        assert!(check_ipv4(Ipv4Addr::new(100, 64, 0, 1)).is_err());
        assert!(check_ipv4(Ipv4Addr::new(100, 127, 255, 255)).is_err());
        assert!(check_ipv4(Ipv4Addr::new(100, 63, 0, 1)).is_ok());
    }

    #[test]
    fn rejects_link_local_and_zero_block() {
        assert!(check_ipv4(Ipv4Addr::new(169, 254, 1, 1)).is_err());
        assert!(check_ipv4(Ipv4Addr::new(0, 0, 0, 1)).is_err());
    }

    #[test]
    fn accepts_public_v4() {
        assert!(check_ipv4(Ipv4Addr::new(93, 184, 216, 34)).is_ok());
    }

    #[test]
    fn rejects_ipv6_loopback_and_ula() {
        assert!(check_ipv6(Ipv6Addr::LOCALHOST).is_err());
        assert!(check_ipv6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)).is_err());
        assert!(check_ipv6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)).is_err());
    }
}
