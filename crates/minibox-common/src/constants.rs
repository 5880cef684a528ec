//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default base directory for all minibox state.
pub const DEFAULT_ROOT: &str = "/var/lib/minibox";

/// Environment variable that overrides [`DEFAULT_ROOT`].
pub const ROOT_ENV: &str = "MINIBOX_ROOT";

/// Per-container metadata directory, relative to the root.
pub const CONTAINERS_DIR: &str = "containers";
/// Overlay layer directory, relative to the root.
pub const OVERLAY_DIR: &str = "overlay2";
/// Image archive directory, relative to the root.
pub const IMAGE_DIR: &str = "image";
/// Network state directory, relative to the root.
pub const NETWORK_DIR: &str = "network";

/// Name of the metadata file inside a container directory.
pub const CONFIG_FILE: &str = "config.json";
/// Suffix of the detached-run log file (`<id>-json.log`).
pub const LOG_SUFFIX: &str = "-json.log";
/// Extension of image archives.
pub const IMAGE_EXTENSION: &str = "tar";

/// Runtime-wide cgroup name shared by all containers.
pub const DEFAULT_CGROUP_NAME: &str = "minibox-cgroup";

/// Verb that re-invokes the binary as the container bootstrap.
pub const INIT_VERB: &str = "init";

/// File descriptor on which the child reads its command.
pub const COMMAND_PIPE_FD: i32 = 3;

/// Environment variable carrying the target pid for the exec helper.
pub const ENV_EXEC_PID: &str = "MINIBOX_PID";
/// Environment variable carrying the command for the exec helper.
pub const ENV_EXEC_CMD: &str = "MINIBOX_CMD";

/// Length of a generated container id.
pub const CONTAINER_ID_LEN: usize = 10;

/// Timestamp layout used in container records.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Application name used in CLI output.
pub const APP_NAME: &str = "minibox";

fn resolve_root() -> PathBuf {
    std::env::var_os(ROOT_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_ROOT), PathBuf::from)
}

static ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Returns the root directory for this session.
///
/// Resolved once from `MINIBOX_ROOT`, falling back to [`DEFAULT_ROOT`].
pub fn root_dir() -> &'static PathBuf {
    ROOT.get_or_init(resolve_root)
}
