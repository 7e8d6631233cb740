//! External binary resolution

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ProcessError;

/// Resolve `name` to an executable file
///
/// Names containing a path separator are checked as-is; bare names are
/// searched for on `PATH`.
pub fn require_binary(name: &str) -> Result<PathBuf, ProcessError> {
    let resolved = if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        is_executable(&path).then_some(path)
    } else {
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(name))
                .find(|candidate| is_executable(candidate))
        })
    };

    match resolved {
        Some(path) => {
            debug!("Resolved {} to {:?}", name, path);
            Ok(path)
        }
        None => Err(ProcessError::MissingBinary(name.to_string())),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
