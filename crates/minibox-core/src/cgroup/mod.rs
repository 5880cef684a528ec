//! Cgroups v1 resource management.
//!
//! A [`CgroupManager`] owns one runtime-wide cgroup name and fans every
//! operation out to the fixed set of [`Subsystem`] backends. Backend failures
//! are logged and reported back, never allowed to stop the other backends.

pub mod cpu;
pub mod cpuset;
pub mod memory;

use std::fmt;
use std::path::{Path, PathBuf};

use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::ResourceConfig;

use crate::filesystem::mountinfo;

/// The resource-limiting backends known to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// CPU pinning (`cpuset.cpus`).
    CpuSet,
    /// Memory ceiling (`memory.limit_in_bytes`).
    Memory,
    /// CPU bandwidth (`cpu.cfs_quota_us`).
    CpuQuota,
}

impl Subsystem {
    /// Every backend, in application order.
    pub const ALL: [Self; 3] = [Self::CpuSet, Self::Memory, Self::CpuQuota];

    /// Controller name as it appears in the mount table.
    pub const fn controller(self) -> &'static str {
        match self {
            Self::CpuSet => "cpuset",
            Self::Memory => "memory",
            Self::CpuQuota => "cpu",
        }
    }

    /// Whether `resources` sets the field this backend owns.
    pub fn is_requested(self, resources: &ResourceConfig) -> bool {
        match self {
            Self::CpuSet => !resources.cpu_set.is_empty(),
            Self::Memory => !resources.memory_limit.is_empty(),
            Self::CpuQuota => resources.cpu_cfs_quota != 0,
        }
    }

    fn write_limit(self, cgroup_path: &Path, resources: &ResourceConfig) -> Result<()> {
        match self {
            Self::CpuSet => cpuset::set_cpus(cgroup_path, &resources.cpu_set),
            Self::Memory => memory::set_limit(cgroup_path, &resources.memory_limit),
            Self::CpuQuota => cpu::set_quota(cgroup_path, resources.cpu_cfs_quota),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.controller())
    }
}

/// A backend error collected during a fan-out.
#[derive(Debug)]
pub struct SubsystemFailure {
    /// Backend that failed.
    pub subsystem: Subsystem,
    /// What went wrong.
    pub error: MiniboxError,
}

/// Handle to the runtime's cgroup across every v1 hierarchy.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    name: String,
    resources: ResourceConfig,
    mountinfo: PathBuf,
}

impl CgroupManager {
    /// Creates a manager for the cgroup `name` using this process's mount table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_mountinfo(name, mountinfo::PROC_SELF_MOUNTINFO)
    }

    /// Creates a manager that resolves hierarchies from another mount table.
    #[must_use]
    pub fn with_mountinfo(name: impl Into<String>, mountinfo: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            resources: ResourceConfig::default(),
            mountinfo: mountinfo.into(),
        }
    }

    /// Returns the cgroup name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes the limits of `resources` to every backend that has a field set.
    ///
    /// The configuration is kept for [`Self::apply`]. Returns the backends that
    /// failed; each failure has already been logged.
    pub fn set(&mut self, resources: ResourceConfig) -> Vec<SubsystemFailure> {
        self.resources = resources;
        self.fan_out("set", |subsystem| {
            if !subsystem.is_requested(&self.resources) {
                return Ok(());
            }
            let path = self.subsystem_path(subsystem, true)?;
            subsystem.write_limit(&path, &self.resources)
        })
    }

    /// Adds `pid` to the cgroup of every backend that has a field set.
    pub fn apply(&self, pid: u32) -> Vec<SubsystemFailure> {
        self.fan_out("apply", |subsystem| {
            if !subsystem.is_requested(&self.resources) {
                return Ok(());
            }
            let path = self.subsystem_path(subsystem, false)?;
            write_control(&path, "tasks", &pid.to_string())?;
            tracing::debug!(pid, subsystem = %subsystem, "added process to cgroup");
            Ok(())
        })
    }

    /// Removes the cgroup directory from every hierarchy.
    ///
    /// A directory that is already gone is not a failure.
    pub fn destroy(&self) -> Vec<SubsystemFailure> {
        self.fan_out("destroy", |subsystem| {
            let Some(root) = mountinfo::read_mount_point(&self.mountinfo, subsystem.controller())?
            else {
                return Ok(());
            };
            remove_cgroup_dir(&root.join(&self.name))
        })
    }

    fn fan_out<F>(&self, operation: &str, mut op: F) -> Vec<SubsystemFailure>
    where
        F: FnMut(Subsystem) -> Result<()>,
    {
        let mut failures = Vec::new();
        for subsystem in Subsystem::ALL {
            if let Err(error) = op(subsystem) {
                tracing::error!(
                    cgroup = %self.name,
                    subsystem = %subsystem,
                    operation,
                    error = %error,
                    "cgroup subsystem failed"
                );
                failures.push(SubsystemFailure { subsystem, error });
            }
        }
        failures
    }

    /// Resolves `<mount point>/<name>` for a backend, creating it on request.
    fn subsystem_path(&self, subsystem: Subsystem, create: bool) -> Result<PathBuf> {
        let root = mountinfo::read_mount_point(&self.mountinfo, subsystem.controller())?
            .ok_or_else(|| MiniboxError::NotFound {
                kind: "cgroup hierarchy",
                id: subsystem.controller().to_string(),
            })?;
        let path = root.join(&self.name);
        if !path.exists() {
            if !create {
                return Err(MiniboxError::NotFound {
                    kind: "cgroup",
                    id: path.display().to_string(),
                });
            }
            std::fs::create_dir(&path).map_err(|e| MiniboxError::io(&path, e))?;
            tracing::info!(path = %path.display(), "cgroup created");
        }
        Ok(path)
    }
}

/// Writes `value` into the control file `file` of a cgroup directory.
pub(crate) fn write_control(cgroup_path: &Path, file: &str, value: &str) -> Result<()> {
    let path = cgroup_path.join(file);
    std::fs::write(&path, value).map_err(|e| MiniboxError::io(&path, e))
}

/// Removes a cgroup directory.
///
/// On cgroupfs a plain `rmdir` succeeds even though control files are listed;
/// elsewhere the directory contents must be removed first.
fn remove_cgroup_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(_) => match std::fs::remove_dir_all(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(MiniboxError::io(path, e)),
        },
    }
    tracing::info!(path = %path.display(), "cgroup destroyed");
    Ok(())
}
