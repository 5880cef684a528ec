//! Linux namespace management for container isolation.
//!
//! New namespaces are requested as clone flags when the container's init
//! process is created. Existing namespaces are joined through the
//! `/proc/<pid>/ns/*` files with `setns(2)`.

pub mod network;

use std::fs::File;
use std::path::PathBuf;

use minibox_common::error::{MiniboxError, Result};

#[cfg(target_os = "linux")]
use nix::sched::CloneFlags;

/// Configuration for which namespaces to create.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate PID namespace.
    pub pid: bool,
    /// Isolate mount namespace.
    pub mount: bool,
    /// Isolate network namespace.
    pub network: bool,
    /// Isolate IPC namespace.
    pub ipc: bool,
    /// Isolate UTS (hostname) namespace.
    pub uts: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            mount: true,
            network: true,
            ipc: true,
            uts: true,
        }
    }
}

#[cfg(target_os = "linux")]
impl NamespaceConfig {
    /// Translates the configuration into `clone(2)` flags.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        for (enabled, flag) in [
            (self.uts, CloneFlags::CLONE_NEWUTS),
            (self.pid, CloneFlags::CLONE_NEWPID),
            (self.mount, CloneFlags::CLONE_NEWNS),
            (self.network, CloneFlags::CLONE_NEWNET),
            (self.ipc, CloneFlags::CLONE_NEWIPC),
        ] {
            if enabled {
                flags |= flag;
            }
        }
        flags
    }
}

/// A namespace that can be joined through `/proc/<pid>/ns/<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Hostname and domain name.
    Uts,
    /// Network stack.
    Net,
    /// Process ids; applies to children spawned after joining.
    Pid,
    /// Mount table.
    Mnt,
}

impl NamespaceKind {
    /// Join order used when entering a running container. The mount
    /// namespace is last because it changes how later paths resolve.
    pub const JOIN_ORDER: [Self; 5] = [Self::Ipc, Self::Uts, Self::Net, Self::Pid, Self::Mnt];

    /// File name under `/proc/<pid>/ns/`.
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Ipc => "ipc",
            Self::Uts => "uts",
            Self::Net => "net",
            Self::Pid => "pid",
            Self::Mnt => "mnt",
        }
    }

    /// Path of this namespace for process `pid`.
    #[must_use]
    pub fn path_for(self, pid: i32) -> PathBuf {
        PathBuf::from(format!("/proc/{pid}/ns/{}", self.proc_name()))
    }

    #[cfg(target_os = "linux")]
    const fn clone_flag(self) -> CloneFlags {
        match self {
            Self::Ipc => CloneFlags::CLONE_NEWIPC,
            Self::Uts => CloneFlags::CLONE_NEWUTS,
            Self::Net => CloneFlags::CLONE_NEWNET,
            Self::Pid => CloneFlags::CLONE_NEWPID,
            Self::Mnt => CloneFlags::CLONE_NEWNS,
        }
    }
}

/// Opens a namespace file of process `pid`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened (process gone or no access).
pub fn open_namespace(pid: i32, kind: NamespaceKind) -> Result<File> {
    let path = kind.path_for(pid);
    File::open(&path).map_err(|e| MiniboxError::io(&path, e))
}

/// Moves the calling thread into the namespace behind `ns_file`.
///
/// # Errors
///
/// Returns an error if `setns(2)` fails.
#[cfg(target_os = "linux")]
pub fn join_namespace(ns_file: &File, kind: NamespaceKind) -> Result<()> {
    nix::sched::setns(ns_file, kind.clone_flag()).map_err(|e| {
        MiniboxError::PermissionDenied {
            message: format!("setns {} failed: {e}", kind.proc_name()),
        }
    })?;
    tracing::debug!(namespace = kind.proc_name(), "joined namespace");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; namespace joining requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn join_namespace(_ns_file: &File, _kind: NamespaceKind) -> Result<()> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Joins every namespace of process `pid` in [`NamespaceKind::JOIN_ORDER`].
///
/// All namespace files are opened before the first join. The mount namespace
/// can only be joined by a single-threaded process.
///
/// # Errors
///
/// Returns an error if a namespace file cannot be opened or joined.
pub fn join_all(pid: i32) -> Result<()> {
    let files = NamespaceKind::JOIN_ORDER
        .iter()
        .map(|kind| open_namespace(pid, *kind).map(|file| (*kind, file)))
        .collect::<Result<Vec<_>>>()?;
    for (kind, file) in &files {
        join_namespace(file, *kind)?;
    }
    tracing::info!(pid, "joined container namespaces");
    Ok(())
}
