//! Named pipe creation

use std::path::Path;

use crate::error::BridgeError;

/// Create a fresh owner-only FIFO at `path`, replacing whatever was there
#[cfg(unix)]
pub fn create_fifo(path: &Path) -> Result<(), BridgeError> {
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(BridgeError::FifoCreate {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| BridgeError::FifoCreate {
        path: path.to_path_buf(),
        source: std::io::Error::from(errno),
    })
}

#[cfg(not(unix))]
pub fn create_fifo(_path: &Path) -> Result<(), BridgeError> {
    Err(BridgeError::FifoUnsupported)
}
