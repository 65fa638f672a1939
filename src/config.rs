//! Tunnel configuration.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::packet::DNS_PORT;

/// Address given to the local end of the tunnel.
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
/// Address advertised to the device as its DNS server.
pub const VIRTUAL_DNS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);
/// Default upstream resolver.
pub const DEFAULT_UPSTREAM: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
pub const DEFAULT_MTU: u16 = 1500;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_WORKERS: usize = 50;

/// Parameters for establishing the virtual interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// Requested device name.
    pub name: String,
    /// Local address (/32).
    pub address: Ipv4Addr,
    /// Virtual DNS server: the only routed address and the DNS server.
    pub dns_server: Ipv4Addr,
    pub mtu: u16,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: "dnsinspect0".to_string(),
            address: DEFAULT_ADDRESS,
            dns_server: VIRTUAL_DNS,
            mtu: DEFAULT_MTU,
        }
    }
}

/// Configuration for the tunnel pump.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub interface: InterfaceConfig,
    /// Where queries are forwarded. Read at start.
    pub upstream: SocketAddrV4,
    /// How long a worker waits for the upstream reply.
    pub upstream_timeout: Duration,
    /// Number of packets processed concurrently.
    pub workers: usize,
    /// Log every answered query.
    pub verbose: bool,
}

impl TunnelConfig {
    /// How long `stop()` lets in-flight workers finish before aborting them.
    pub fn shutdown_grace(&self) -> Duration {
        self.upstream_timeout + Duration::from_millis(500)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            interface: InterfaceConfig::default(),
            upstream: SocketAddrV4::new(DEFAULT_UPSTREAM, DNS_PORT),
            upstream_timeout: DEFAULT_TIMEOUT,
            workers: DEFAULT_WORKERS,
            verbose: false,
        }
    }
}

/// Parse an upstream resolver given as `ip` or `ip:port` (port 53 by default).
pub fn parse_upstream(s: &str) -> Result<SocketAddrV4, String> {
    let s = s.trim();
    if let Ok(addr) = s.parse::<SocketAddrV4>() {
        return Ok(addr);
    }
    s.parse::<Ipv4Addr>()
        .map(|ip| SocketAddrV4::new(ip, DNS_PORT))
        .map_err(|_| format!("invalid upstream resolver '{s}': expected an IPv4 address"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_defaults_to_port_53() {
        assert_eq!(
            parse_upstream("8.8.8.8").unwrap(),
            SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 53)
        );
        assert_eq!(
            parse_upstream(" 9.9.9.9:5353 ").unwrap(),
            SocketAddrV4::new(Ipv4Addr::new(9, 9, 9, 9), 5353)
        );
    }

    #[test]
    fn upstream_rejects_names_and_ipv6() {
        assert!(parse_upstream("dns.google").is_err());
        assert!(parse_upstream("::1").is_err());
        assert!(parse_upstream("").is_err());
    }

    #[test]
    fn defaults_match_the_tunnel_layout() {
        let config = TunnelConfig::default();

        assert_eq!(config.interface.address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(config.interface.dns_server, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(config.interface.mtu, 1500);
        assert_eq!(config.upstream.to_string(), "1.1.1.1:53");
        assert_eq!(config.upstream_timeout, Duration::from_secs(2));
        assert_eq!(config.workers, 50);
    }
}
