//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating the tunnel configuration
///
/// All of these are fatal: the tunnel never starts with an invalid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid port for {field}: {port}")]
    InvalidPort { field: String, port: u16 },

    #[error("Invalid {kind}: {detail}")]
    InvalidForward { kind: &'static str, detail: String },

    #[error("Port collision: {0}")]
    PortCollision(String),

    #[error("SSH key not readable: {0:?}")]
    KeyNotReadable(PathBuf),
}
