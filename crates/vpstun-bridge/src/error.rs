//! Bridge construction errors

use std::path::PathBuf;
use thiserror::Error;
use vpstun_process::ProcessError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to create pipe directory: {0}")]
    PipeDir(#[source] std::io::Error),

    #[error("Failed to create FIFO {path:?}: {source}")]
    FifoCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FIFO creation is not supported on this platform")]
    FifoUnsupported,

    #[error("Failed to start relay for udp_public_port={port}: {source}")]
    Relay {
        port: u16,
        #[source]
        source: ProcessError,
    },
}
