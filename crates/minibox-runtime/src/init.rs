//! Bootstrap run inside a new container before the user command.
//!
//! Invoked as `minibox init` by the cloned child. The working directory is
//! the container root prepared by the parent.

use std::convert::Infallible;
use std::fs::File;
use std::io::Read;
use std::os::fd::FromRawFd;

use minibox_common::constants::COMMAND_PIPE_FD;
use minibox_common::error::{MiniboxError, Result};
use minibox_core::filesystem::{mount, pivot_root};

/// Switches into the container root, mounts `/proc` and `/dev`, reads the
/// command from the pipe and replaces this process with it.
///
/// Only returns on failure.
///
/// # Errors
///
/// Returns an error if any setup step fails, the command is empty or cannot
/// be resolved on `PATH`, or `execv(2)` fails.
pub fn run() -> Result<Infallible> {
    let root = std::env::current_dir().map_err(|e| MiniboxError::io(".", e))?;
    tracing::debug!(root = %root.display(), "container init starting");

    mount::make_root_private()?;
    pivot_root::pivot_root(&root)?;
    mount::mount_proc()?;
    mount::mount_dev()?;

    let command = parse_command(&read_command()?);
    let Some(program) = command.first() else {
        return Err(MiniboxError::Config {
            message: "init received an empty command".into(),
        });
    };
    exec(program, &command)
}

/// Reads the whole message from the command pipe.
fn read_command() -> Result<String> {
    // SAFETY: the parent installed the read end of the command pipe as this
    // descriptor before exec, and nothing else in this process owns it.
    let mut pipe = unsafe { File::from_raw_fd(COMMAND_PIPE_FD) };
    let mut message = String::new();
    let _ = pipe
        .read_to_string(&mut message)
        .map_err(|e| MiniboxError::io("command pipe", e))?;
    Ok(message)
}

/// Splits the pipe message into program and arguments.
fn parse_command(message: &str) -> Vec<String> {
    message.split_whitespace().map(str::to_string).collect()
}

#[cfg(target_os = "linux")]
fn exec(program: &str, command: &[String]) -> Result<Infallible> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let path = which::which(program).map_err(|e| MiniboxError::NotFound {
        kind: "command",
        id: format!("{program}: {e}"),
    })?;
    tracing::debug!(path = %path.display(), "exec user command");

    let nul = |_| MiniboxError::Config {
        message: format!("command {program:?} contains a NUL byte"),
    };
    let path = CString::new(path.as_os_str().as_bytes()).map_err(nul)?;
    let args = command
        .iter()
        .map(|arg| CString::new(arg.as_str()).map_err(nul))
        .collect::<Result<Vec<_>>>()?;

    nix::unistd::execv(&path, &args).map_err(|e| MiniboxError::PermissionDenied {
        message: format!("exec {program} failed: {e}"),
    })
}

#[cfg(not(target_os = "linux"))]
fn exec(_program: &str, _command: &[String]) -> Result<Infallible> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_splits_on_any_whitespace() {
        assert_eq!(parse_command("top  -b\n"), ["top", "-b"]);
        assert_eq!(parse_command("sh -c ls"), ["sh", "-c", "ls"]);
    }

    #[test]
    fn empty_message_has_no_program() {
        assert!(parse_command("   ").is_empty());
    }
}
