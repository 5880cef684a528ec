//! CPU bandwidth control through the v1 `cpu` controller.

use std::path::Path;

use minibox_common::error::Result;

/// CFS scheduling period written alongside every quota.
pub const CFS_PERIOD_US: u64 = 100_000;

/// Limits the cgroup to `percent` of one CPU per CFS period.
///
/// # Errors
///
/// Returns an error if writing `cpu.cfs_period_us` or `cpu.cfs_quota_us` fails.
pub fn set_quota(cgroup_path: &Path, percent: u32) -> Result<()> {
    let quota_us = CFS_PERIOD_US / 100 * u64::from(percent);
    super::write_control(cgroup_path, "cpu.cfs_period_us", &CFS_PERIOD_US.to_string())?;
    super::write_control(cgroup_path, "cpu.cfs_quota_us", &quota_us.to_string())?;
    tracing::debug!(percent, quota_us, "CPU quota set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_a_share_of_the_period() {
        let dir = tempfile::tempdir().expect("tempdir");
        set_quota(dir.path(), 50).expect("set");
        let period = std::fs::read_to_string(dir.path().join("cpu.cfs_period_us")).expect("read");
        let quota = std::fs::read_to_string(dir.path().join("cpu.cfs_quota_us")).expect("read");
        assert_eq!(period, "100000");
        assert_eq!(quota, "50000");
    }

    #[test]
    fn quota_above_one_core_is_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        set_quota(dir.path(), 250).expect("set");
        let quota = std::fs::read_to_string(dir.path().join("cpu.cfs_quota_us")).expect("read");
        assert_eq!(quota, "250000");
    }
}
