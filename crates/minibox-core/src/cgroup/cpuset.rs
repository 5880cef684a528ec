//! CPU pinning through the v1 `cpuset` controller.

use std::path::Path;

use minibox_common::error::{MiniboxError, Result};

/// Restricts the cgroup to the given CPU list, e.g. `0-1` or `0,2`.
///
/// A fresh cpuset cgroup has an empty `cpuset.mems`, which makes any later
/// task attach fail; it is seeded from the parent before writing the CPUs.
///
/// # Errors
///
/// Returns an error if a control file cannot be read or written.
pub fn set_cpus(cgroup_path: &Path, cpus: &str) -> Result<()> {
    inherit_from_parent(cgroup_path, "cpuset.mems")?;
    super::write_control(cgroup_path, "cpuset.cpus", cpus)?;
    tracing::debug!(cpus, "cpuset set");
    Ok(())
}

fn inherit_from_parent(cgroup_path: &Path, file: &str) -> Result<()> {
    let own = cgroup_path.join(file);
    let Some(parent) = cgroup_path.parent() else {
        return Ok(());
    };
    if !own.exists() {
        return Ok(());
    }
    let current = std::fs::read_to_string(&own).map_err(|e| MiniboxError::io(&own, e))?;
    if !current.trim().is_empty() {
        return Ok(());
    }
    let inherited = parent.join(file);
    let value =
        std::fs::read_to_string(&inherited).map_err(|e| MiniboxError::io(&inherited, e))?;
    super::write_control(cgroup_path, file, value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_cpus_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        set_cpus(dir.path(), "0-1").expect("set");
        let written = std::fs::read_to_string(dir.path().join("cpuset.cpus")).expect("read");
        assert_eq!(written, "0-1");
    }

    #[test]
    fn empty_mems_are_seeded_from_parent() {
        let parent = tempfile::tempdir().expect("tempdir");
        std::fs::write(parent.path().join("cpuset.mems"), "0\n").expect("write");
        let child = parent.path().join("group");
        std::fs::create_dir(&child).expect("mkdir");
        std::fs::write(child.join("cpuset.mems"), "").expect("write");

        set_cpus(&child, "0").expect("set");
        let mems = std::fs::read_to_string(child.join("cpuset.mems")).expect("read");
        assert_eq!(mems, "0");
    }
}
