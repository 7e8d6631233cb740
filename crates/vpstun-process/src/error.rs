//! Process layer errors

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Missing dependency: {0} not found in PATH")]
    MissingBinary(String),

    #[error("Failed to open log file {path:?}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {tag}: {source}")]
    Spawn {
        tag: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Port not listening: 127.0.0.1:{port} (waited {waited:?})")]
    NotListening { port: u16, waited: Duration },
}
