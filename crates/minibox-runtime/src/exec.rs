//! Running a command inside a running container.
//!
//! The runtime re-executes itself with [`ENV_EXEC_PID`] and [`ENV_EXEC_CMD`]
//! set, plus the environment of the container's init process. The helper
//! notices those variables before doing anything else, joins every namespace
//! of the target while still single-threaded, then runs the command through
//! `sh -c`.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;
use std::process::Command;

use minibox_common::constants::{ENV_EXEC_CMD, ENV_EXEC_PID};
use minibox_common::error::{MiniboxError, Result};
use minibox_core::namespace;

use crate::process::SELF_EXE;

/// A request found in the environment of a helper process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Pid whose namespaces are joined.
    pub pid: i32,
    /// Shell command to run.
    pub command: String,
}

impl ExecRequest {
    /// Reads the request from the process environment, if this process is a
    /// helper.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let pid = std::env::var(ENV_EXEC_PID).ok()?;
        let command = std::env::var(ENV_EXEC_CMD).unwrap_or_default();
        Self::parse(&pid, command)
    }

    fn parse(pid: &str, command: String) -> Option<Self> {
        let pid = pid.trim().parse().ok().filter(|p: &i32| *p > 0)?;
        Some(Self { pid, command })
    }

    /// Joins the target's namespaces and runs the command, returning its
    /// exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if a namespace cannot be joined or the shell cannot
    /// be started.
    pub fn run(&self) -> Result<i32> {
        namespace::join_all(self.pid)?;
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .status()
            .map_err(|e| MiniboxError::io("sh", e))?;
        Ok(status.code().unwrap_or(1))
    }
}

/// Runs `command` inside the container whose init process is `pid`,
/// inheriting the caller's stdio. Returns the command's exit code.
///
/// # Errors
///
/// Returns an error if the command is empty, the target's environment cannot
/// be read, or the helper cannot be started.
pub fn exec_in_container(pid: i32, command: &[String]) -> Result<i32> {
    if command.is_empty() {
        return Err(MiniboxError::Config {
            message: "exec command is empty".into(),
        });
    }
    let environ = read_environ(pid)?;
    let joined = command.join(" ");
    tracing::info!(pid, command = %joined, "exec into container");

    let status = Command::new(SELF_EXE)
        .arg("exec")
        .envs(environ)
        .env(ENV_EXEC_PID, pid.to_string())
        .env(ENV_EXEC_CMD, &joined)
        .status()
        .map_err(|e| MiniboxError::io(SELF_EXE, e))?;
    Ok(status.code().unwrap_or(1))
}

/// Environment of process `pid`, from `/proc/<pid>/environ`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_environ(pid: i32) -> Result<Vec<(OsString, OsString)>> {
    let path = PathBuf::from(format!("/proc/{pid}/environ"));
    let content = std::fs::read(&path).map_err(|e| MiniboxError::io(&path, e))?;
    Ok(parse_environ(&content))
}

fn parse_environ(content: &[u8]) -> Vec<(OsString, OsString)> {
    content
        .split(|b| *b == 0)
        .filter_map(|entry| {
            let eq = entry.iter().position(|b| *b == b'=')?;
            if eq == 0 {
                return None;
            }
            Some((
                OsString::from_vec(entry[..eq].to_vec()),
                OsString::from_vec(entry[eq + 1..].to_vec()),
            ))
        })
        .collect()
}
