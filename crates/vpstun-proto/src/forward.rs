//! Forward specifications

use serde::{Deserialize, Serialize};
use std::fmt;

/// A TCP service exposed on the VPS through an SSH reverse-forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpForward {
    /// Port opened on the VPS (all interfaces)
    pub remote_port: u16,
    /// Host the traffic is delivered to on the private side
    pub local_host: String,
    /// Port the traffic is delivered to on the private side
    pub local_port: u16,
}

impl TcpForward {
    /// Reverse-forward specification for `ssh -R`
    pub fn reverse_spec(&self) -> String {
        format!(
            "0.0.0.0:{}:{}:{}",
            self.remote_port,
            bracket_host(&self.local_host),
            self.local_port
        )
    }
}

impl fmt::Display for TcpForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tcp {} -> {}:{}",
            self.remote_port, self.local_host, self.local_port
        )
    }
}

/// A UDP service exposed on the VPS by wrapping datagrams into a TCP stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpForward {
    /// Public UDP port on the VPS
    #[serde(rename = "udp_public_port", alias = "public_port")]
    pub public_port: u16,
    /// Host of the private UDP service
    pub local_host: String,
    /// Port of the private UDP service
    pub local_udp_port: u16,
    /// Loopback-only TCP port carrying the wrapped datagrams across SSH
    pub wrap_tcp_port: u16,
}

impl UdpForward {
    /// Reverse-forward specification carrying this forward's wrap port
    ///
    /// Both ends are bound to loopback; the wrap port is never public.
    pub fn reverse_spec(&self) -> String {
        format!(
            "{lo}:{port}:{lo}:{port}",
            lo = crate::LOOPBACK,
            port = self.wrap_tcp_port
        )
    }

    /// Tag used for process names and log files
    pub fn tag(&self) -> String {
        format!("udp-{}", self.public_port)
    }

    /// Relay address of the private UDP service
    pub fn local_udp_target(&self) -> String {
        format!("{}:{}", bracket_host(&self.local_host), self.local_udp_port)
    }
}

impl fmt::Display for UdpForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "udp {} -> {}:{} (wrap tcp {})",
            self.public_port, self.local_host, self.local_udp_port, self.wrap_tcp_port
        )
    }
}

/// Wrap IPv6 literals in brackets so `host:port` stays unambiguous
pub fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp() -> UdpForward {
        UdpForward {
            public_port: 9002,
            local_host: "127.0.0.1".to_string(),
            local_udp_port: 8002,
            wrap_tcp_port: 10000,
        }
    }

    #[test]
    fn test_tcp_reverse_spec() {
        let forward = TcpForward {
            remote_port: 8080,
            local_host: "192.168.1.10".to_string(),
            local_port: 80,
        };
        assert_eq!(forward.reverse_spec(), "0.0.0.0:8080:192.168.1.10:80");
    }

    #[test]
    fn test_udp_reverse_spec_is_loopback_only() {
        assert_eq!(udp().reverse_spec(), "127.0.0.1:10000:127.0.0.1:10000");
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        let forward = UdpForward {
            local_host: "::1".to_string(),
            ..udp()
        };
        assert_eq!(forward.local_udp_target(), "[::1]:8002");
        assert_eq!(bracket_host("[::1]"), "[::1]");
        assert_eq!(bracket_host("localhost"), "localhost");
    }

    #[test]
    fn test_udp_yaml_field_names() {
        let yaml = "udp_public_port: 9002\nlocal_host: 127.0.0.1\nlocal_udp_port: 8002\nwrap_tcp_port: 10000\n";
        let parsed: UdpForward = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed, udp());
        assert_eq!(parsed.tag(), "udp-9002");
    }
}
