//! Creation of a container's init process.
//!
//! The parent clones a child into fresh namespaces. The child installs the
//! read end of the command pipe as fd 3, redirects its output to the log file
//! for detached runs, enters the merged root directory and re-executes the
//! running binary as `init`. The parent then writes the user command into the
//! pipe and closes it; that is the only message ever sent.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use minibox_common::error::{MiniboxError, Result};
use minibox_core::namespace::NamespaceConfig;

/// Stack handed to the cloned child. It only runs until `execv`.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Exit status of a child that failed before exec.
const EXEC_FAILED: isize = 127;

/// Path through which a process re-executes its own binary.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Where the init process starts and where its output goes.
#[derive(Debug)]
pub struct InitSpec<'a> {
    /// Container root; becomes the child's working directory.
    pub root: &'a Path,
    /// Namespaces created for the child.
    pub namespaces: NamespaceConfig,
    /// Log file receiving stdout and stderr; `None` inherits the caller's stdio.
    pub log: Option<File>,
}

/// A started init process waiting for its command.
#[derive(Debug)]
pub struct InitProcess {
    pid: i32,
    pipe: Option<File>,
}

impl InitProcess {
    /// Host pid of the init process.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    /// Writes the space-joined `command` and closes the pipe.
    ///
    /// # Errors
    ///
    /// Returns an error if the command was already sent or the write fails.
    pub fn send_command(&mut self, command: &[String]) -> Result<()> {
        let mut pipe = self.pipe.take().ok_or_else(|| MiniboxError::InvalidState {
            id: self.pid.to_string(),
            message: "command already sent".into(),
        })?;
        let message = command.join(" ");
        pipe.write_all(message.as_bytes())
            .map_err(|e| MiniboxError::io("command pipe", e))?;
        tracing::info!(pid = self.pid, command = %message, "command sent to init");
        Ok(())
    }

    /// Blocks until the init process exits and returns its exit code.
    /// Death by signal `n` reports `128 + n`.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails.
    #[cfg(target_os = "linux")]
    pub fn wait(&self) -> Result<i32> {
        use nix::errno::Errno;
        use nix::sys::wait::{WaitStatus, waitpid};
        use nix::unistd::Pid;

        loop {
            match waitpid(Pid::from_raw(self.pid), None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(code),
                Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => {
                    return Err(MiniboxError::PermissionDenied {
                        message: format!("waitpid {} failed: {e}", self.pid),
                    });
                }
            }
        }
    }

    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns an error; process management requires Linux.
    #[cfg(not(target_os = "linux"))]
    pub fn wait(&self) -> Result<i32> {
        Err(unsupported())
    }
}

/// Clones the init process described by `spec`.
///
/// # Errors
///
/// Returns an error if the pipe cannot be created or `clone(2)` fails.
#[cfg(target_os = "linux")]
pub fn spawn(spec: InitSpec<'_>) -> Result<InitProcess> {
    use std::os::fd::AsRawFd;

    use minibox_common::constants::{APP_NAME, COMMAND_PIPE_FD, INIT_VERB};
    use nix::fcntl::OFlag;

    let (read_end, write_end) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| MiniboxError::PermissionDenied {
            message: format!("pipe creation failed: {e}"),
        })?;

    let exe = c_string(SELF_EXE)?;
    let argv = [c_string(APP_NAME)?, c_string(INIT_VERB)?];
    let root = spec.root.to_path_buf();
    let read_fd = read_end.as_raw_fd();
    let log_fd = spec.log.as_ref().map(AsRawFd::as_raw_fd);

    let child = Box::new(|| -> isize {
        if let Some(fd) = log_fd {
            // SAFETY: `fd` is the open log file inherited from the parent;
            // stdout and stderr are replaced in this process only.
            if unsafe { libc::dup2(fd, 1) } < 0 || unsafe { libc::dup2(fd, 2) } < 0 {
                return EXEC_FAILED;
            }
        }
        let installed = if read_fd == COMMAND_PIPE_FD {
            // SAFETY: clears close-on-exec on a descriptor this process owns.
            unsafe { libc::fcntl(read_fd, libc::F_SETFD, 0) }
        } else {
            // SAFETY: duplicates the inherited pipe end onto the agreed fd;
            // the copy does not carry close-on-exec.
            unsafe { libc::dup2(read_fd, COMMAND_PIPE_FD) }
        };
        if installed < 0 || nix::unistd::chdir(&root).is_err() {
            return EXEC_FAILED;
        }
        let _ = nix::unistd::execv(&exe, &argv);
        EXEC_FAILED
    });

    let mut stack = vec![0_u8; CHILD_STACK_SIZE];
    let flags = spec.namespaces.clone_flags();
    // SAFETY: the child gets its own copy of the address space (no CLONE_VM)
    // and only touches descriptors and strings prepared above before it
    // either execs or returns.
    let pid = unsafe { nix::sched::clone(child, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| MiniboxError::PermissionDenied {
            message: format!("clone failed: {e}"),
        })?;

    drop(read_end);
    drop(spec.log);
    tracing::info!(pid = pid.as_raw(), root = %spec.root.display(), "init process started");
    Ok(InitProcess {
        pid: pid.as_raw(),
        pipe: Some(File::from(write_end)),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn spawn(_spec: InitSpec<'_>) -> Result<InitProcess> {
    Err(unsupported())
}

#[cfg(target_os = "linux")]
fn c_string(s: &str) -> Result<std::ffi::CString> {
    std::ffi::CString::new(s).map_err(|_| MiniboxError::Config {
        message: format!("{s:?} contains a NUL byte"),
    })
}

/// Whether process `pid` still exists.
#[cfg(target_os = "linux")]
#[must_use]
pub fn is_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

/// Stub for non-Linux platforms; reports every process as gone.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub const fn is_alive(_pid: i32) -> bool {
    false
}

/// Sends SIGTERM to `pid`. A process that is already gone is not an error.
///
/// # Errors
///
/// Returns an error if the signal cannot be delivered for another reason.
#[cfg(target_os = "linux")]
pub fn terminate(pid: i32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => {
            tracing::info!(pid, "sent SIGTERM");
            Ok(())
        }
        Err(Errno::ESRCH) => {
            tracing::debug!(pid, "process already gone");
            Ok(())
        }
        Err(e) => Err(MiniboxError::PermissionDenied {
            message: format!("kill {pid} failed: {e}"),
        }),
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; signalling requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn terminate(_pid: i32) -> Result<()> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> MiniboxError {
    MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    }
}
