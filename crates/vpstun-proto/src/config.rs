//! Tunnel configuration file support
//!
//! A single YAML file describes the VPS, every TCP and UDP forward, and the
//! timing knobs of the supervisor. Missing optional values fall back to
//! defaults; the result is validated before any process is started.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;
use crate::forward::{TcpForward, UdpForward};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vpstun/config.yaml";

/// SSH connection identity of the public VPS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpsConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub user: String,

    /// SSH port (default: 22)
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Private key used for key-based authentication
    #[serde(default)]
    pub ssh_key: PathBuf,

    /// Value passed to `StrictHostKeyChecking` (default: accept-new)
    #[serde(default = "default_strict_hostkey", rename = "strict_hostkey")]
    pub strict_host_key: String,

    /// Seconds between keepalive probes (`ServerAliveInterval`)
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_seconds: u64,

    /// Missed keepalive probes before the connection is declared dead
    #[serde(default = "default_keepalive_count_max")]
    pub keepalive_count_max: u32,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_strict_hostkey() -> String {
    "accept-new".to_string()
}

fn default_keepalive_interval() -> u64 {
    15
}

fn default_keepalive_count_max() -> u32 {
    3
}

impl VpsConfig {
    /// `user@host` target for the SSH client
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Complete tunnel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub vps: VpsConfig,

    /// Delay between SSH reconnect attempts (0 means default)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,

    #[serde(default)]
    pub tcp_forwards: Vec<TcpForward>,

    #[serde(default)]
    pub udp_forwards: Vec<UdpForward>,

    /// Directory for local relay logs, created if absent
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory for relay logs on the VPS
    #[serde(default = "default_log_dir")]
    pub remote_log_dir: PathBuf,

    /// Relay executable (socat-compatible)
    #[serde(default = "default_relay_binary")]
    pub relay_binary: String,

    /// SSH client executable
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,

    /// Inactivity timeout (`-T`) for the children of forking relay listeners
    #[serde(default = "default_relay_idle_timeout")]
    pub relay_idle_timeout_seconds: u64,

    /// How long the local wrap ports may take to start listening
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_seconds: u64,

    /// Grace period between the graceful signal and the forced kill
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

fn default_reconnect_delay() -> u64 {
    2
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log")
}

fn default_relay_binary() -> String {
    "socat".to_string()
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_relay_idle_timeout() -> u64 {
    30
}

fn default_health_check_timeout() -> u64 {
    3
}

fn default_stop_grace() -> u64 {
    2
}

impl TunnelConfig {
    /// Load, normalize and validate a config file, including the SSH key
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&content)?;
        config.validate_key()?;

        debug!(
            "Loaded config from {:?}: {} tcp forward(s), {} udp forward(s)",
            path,
            config.tcp_forwards.len(),
            config.udp_forwards.len()
        );

        Ok(config)
    }

    /// Parse config from a YAML string
    ///
    /// Applies defaults and validates everything except the key file.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: TunnelConfig = serde_yaml::from_str(content)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        if self.reconnect_delay_seconds == 0 {
            self.reconnect_delay_seconds = default_reconnect_delay();
        }
        if self.vps.strict_host_key.is_empty() {
            self.vps.strict_host_key = default_strict_hostkey();
        }
        if self.relay_binary.is_empty() {
            self.relay_binary = default_relay_binary();
        }
        if self.ssh_binary.is_empty() {
            self.ssh_binary = default_ssh_binary();
        }
    }

    /// Validate required fields, port ranges and port collisions
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vps.host.is_empty() {
            return Err(ConfigError::MissingField("vps.host"));
        }
        if self.vps.user.is_empty() {
            return Err(ConfigError::MissingField("vps.user"));
        }
        if self.vps.ssh_key.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("vps.ssh_key"));
        }
        check_port("vps.port", self.vps.port)?;

        let mut remote_ports = HashSet::new();
        for forward in &self.tcp_forwards {
            check_port("tcp_forwards.remote_port", forward.remote_port)?;
            check_port("tcp_forwards.local_port", forward.local_port)?;
            if forward.local_host.is_empty() {
                return Err(ConfigError::InvalidForward {
                    kind: "tcp_forward",
                    detail: format!("empty local_host in {:?}", forward),
                });
            }
            if !remote_ports.insert(forward.remote_port) {
                return Err(ConfigError::PortCollision(format!(
                    "remote_port {} is used by more than one tcp_forward",
                    forward.remote_port
                )));
            }
        }

        let mut public_ports = HashSet::new();
        let mut wrap_ports = HashSet::new();
        for forward in &self.udp_forwards {
            check_port("udp_forwards.udp_public_port", forward.public_port)?;
            check_port("udp_forwards.local_udp_port", forward.local_udp_port)?;
            check_port("udp_forwards.wrap_tcp_port", forward.wrap_tcp_port)?;
            if forward.local_host.is_empty() {
                return Err(ConfigError::InvalidForward {
                    kind: "udp_forward",
                    detail: format!("empty local_host in {:?}", forward),
                });
            }
            if !public_ports.insert(forward.public_port) {
                return Err(ConfigError::PortCollision(format!(
                    "udp_public_port {} is used by more than one udp_forward",
                    forward.public_port
                )));
            }
            if !wrap_ports.insert(forward.wrap_tcp_port) {
                return Err(ConfigError::PortCollision(format!(
                    "wrap_tcp_port {} is used by more than one udp_forward",
                    forward.wrap_tcp_port
                )));
            }
            if let Some(tcp) = self.tcp_forwards.iter().find(|t| {
                t.local_port == forward.wrap_tcp_port || t.remote_port == forward.wrap_tcp_port
            }) {
                return Err(ConfigError::PortCollision(format!(
                    "wrap_tcp_port {} of udp_forward {} collides with tcp_forward {}",
                    forward.wrap_tcp_port, forward.public_port, tcp
                )));
            }
        }

        Ok(())
    }

    /// Check that the SSH key is an existing, non-directory path
    pub fn validate_key(&self) -> Result<(), ConfigError> {
        match std::fs::metadata(&self.vps.ssh_key) {
            Ok(meta) if !meta.is_dir() => Ok(()),
            _ => Err(ConfigError::KeyNotReadable(self.vps.ssh_key.clone())),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }

    /// Generate a template config file content
    pub fn template() -> String {
        r#"# vpstun configuration
# Exposes private TCP and UDP services on a public VPS over one SSH session.

vps:
  host: vps.example.com
  user: tunnel
  port: 22
  ssh_key: /etc/vpstun/id_ed25519
  # strict_hostkey: accept-new
  # keepalive_interval_seconds: 15
  # keepalive_count_max: 3

reconnect_delay_seconds: 2

tcp_forwards:
  - remote_port: 8080
    local_host: 127.0.0.1
    local_port: 80

udp_forwards:
  # wrap_tcp_port is a loopback-only port carrying the datagrams through SSH;
  # it must be unique and must not match any tcp_forward port.
  - udp_public_port: 9002
    local_host: 127.0.0.1
    local_udp_port: 8002
    wrap_tcp_port: 10000

# log_dir: /var/log
# remote_log_dir: /var/log
# relay_binary: socat
# ssh_binary: ssh
"#
        .to_string()
    }
}

fn check_port(field: &str, port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::InvalidPort {
            field: field.to_string(),
            port,
        });
    }
    Ok(())
}
