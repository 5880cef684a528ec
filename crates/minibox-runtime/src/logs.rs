//! Container log files.
//!
//! A detached container's stdout and stderr go to
//! `<containers>/<id>/<id>-json.log`. Interactive runs have no log file.

use std::fs::File;
use std::path::{Path, PathBuf};

use minibox_common::constants::LOG_SUFFIX;
use minibox_common::error::{MiniboxError, Result};

/// Returns the log file path of container `id` inside `container_dir`.
#[must_use]
pub fn log_path(container_dir: &Path, id: &str) -> PathBuf {
    container_dir.join(format!("{id}{LOG_SUFFIX}"))
}

/// Creates (or truncates) the log file, creating its directory first.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn create_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MiniboxError::io(parent, e))?;
    }
    File::create(path).map_err(|e| MiniboxError::io(path, e))
}

/// Reads a container log.
///
/// # Errors
///
/// Returns `MiniboxError::NotFound` if the file does not exist, which is the
/// case for interactive containers.
pub fn read_logs(path: &Path) -> Result<String> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MiniboxError::NotFound {
            kind: "container log",
            id: path.display().to_string(),
        }),
        Err(e) => Err(MiniboxError::io(path, e)),
    }
}
