//! Tunnel data model
//!
//! Forward specifications, VPS identity and the YAML configuration file
//! shared by the bridge builders and the supervisor.

pub mod config;
pub mod error;
pub mod forward;

pub use config::{TunnelConfig, VpsConfig, DEFAULT_CONFIG_PATH};
pub use error::ConfigError;
pub use forward::{TcpForward, UdpForward};

/// Loopback address used for wrap ports on both ends of the tunnel
pub const LOOPBACK: &str = "127.0.0.1";
