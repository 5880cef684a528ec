//! Parsing of the process mount table (`/proc/self/mountinfo`).
//!
//! Used to locate cgroup v1 hierarchies and to tell whether a directory is
//! currently a mount point. Each v1 controller is mounted on its own
//! hierarchy; the controller name appears among the super options (last
//! field) of its line and the mount point is the fifth field.

use std::path::{Path, PathBuf};

use minibox_common::error::{MiniboxError, Result};

/// Mount table of the calling process.
pub const PROC_SELF_MOUNTINFO: &str = "/proc/self/mountinfo";

/// Finds the mount point of `subsystem` in the given mount table contents.
pub fn find_mount_point(mountinfo: &str, subsystem: &str) -> Option<PathBuf> {
    mountinfo.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(' ').collect();
        let options = fields.last()?;
        if options.split(',').any(|opt| opt == subsystem) {
            fields.get(4).map(|mount| PathBuf::from(unescape(mount)))
        } else {
            None
        }
    })
}

/// Reads `mountinfo_path` and returns the mount point of `subsystem`.
///
/// # Errors
///
/// Returns an error if the mount table cannot be read.
pub fn read_mount_point(mountinfo_path: &Path, subsystem: &str) -> Result<Option<PathBuf>> {
    let content =
        std::fs::read_to_string(mountinfo_path).map_err(|e| MiniboxError::io(mountinfo_path, e))?;
    Ok(find_mount_point(&content, subsystem))
}

/// Lists every mount point in the given mount table contents.
pub fn mount_points(mountinfo: &str) -> Vec<PathBuf> {
    mountinfo
        .lines()
        .filter_map(|line| line.split(' ').nth(4))
        .map(|mount| PathBuf::from(unescape(mount)))
        .collect()
}

/// Mount points at or below `root` in the given mount table contents.
pub fn mounts_below(mountinfo: &str, root: &Path) -> Vec<PathBuf> {
    mount_points(mountinfo)
        .into_iter()
        .filter(|mount| mount.starts_with(root))
        .collect()
}

/// Whether `path` is currently a mount point of this process.
///
/// The mount table holds absolute paths with symlinks resolved, so `path`
/// is canonicalized first. A path that does not exist is not a mount point.
///
/// # Errors
///
/// Returns an error if the mount table or the path cannot be read.
pub fn is_mount_point(path: &Path) -> Result<bool> {
    let Some(path) = canonical(path)? else {
        return Ok(false);
    };
    Ok(mount_points(&read_mountinfo()?).contains(&path))
}

/// Mount points of this process at or below `root`, `root` included.
///
/// # Errors
///
/// Returns an error if the mount table or the path cannot be read.
pub fn active_mounts_below(root: &Path) -> Result<Vec<PathBuf>> {
    let Some(root) = canonical(root)? else {
        return Ok(Vec::new());
    };
    Ok(mounts_below(&read_mountinfo()?, &root))
}

fn read_mountinfo() -> Result<String> {
    std::fs::read_to_string(PROC_SELF_MOUNTINFO)
        .map_err(|e| MiniboxError::io(PROC_SELF_MOUNTINFO, e))
}

fn canonical(path: &Path) -> Result<Option<PathBuf>> {
    match std::fs::canonicalize(path) {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MiniboxError::io(path, e)),
    }
}

/// The kernel octal-escapes space, tab, newline and backslash in paths.
fn unescape(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
25 30 0:23 / /sys rw,nosuid,nodev,noexec,relatime shared:7 - sysfs sysfs rw
33 25 0:28 / /sys/fs/cgroup ro,nosuid,nodev,noexec shared:9 - tmpfs tmpfs ro,mode=755
38 33 0:33 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid,nodev,noexec,relatime shared:19 - cgroup cgroup rw,cpu,cpuacct
39 33 0:34 / /sys/fs/cgroup/cpuset rw,nosuid,nodev,noexec,relatime shared:20 - cgroup cgroup rw,cpuset
41 33 0:36 / /sys/fs/cgroup/memory rw,nosuid,nodev,noexec,relatime shared:22 - cgroup cgroup rw,memory";

    #[test]
    fn finds_each_v1_controller() {
        assert_eq!(
            find_mount_point(SAMPLE, "memory"),
            Some(PathBuf::from("/sys/fs/cgroup/memory"))
        );
        assert_eq!(
            find_mount_point(SAMPLE, "cpuset"),
            Some(PathBuf::from("/sys/fs/cgroup/cpuset"))
        );
        assert_eq!(
            find_mount_point(SAMPLE, "cpu"),
            Some(PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"))
        );
    }

    #[test]
    fn option_match_is_exact() {
        assert_eq!(find_mount_point(SAMPLE, "cpuacc"), None);
        assert_eq!(find_mount_point(SAMPLE, "blkio"), None);
    }

    #[test]
    fn escaped_spaces_are_restored() {
        let line = "40 33 0:35 / /tmp/with\\040space rw - cgroup cgroup rw,memory";
        assert_eq!(
            find_mount_point(line, "memory"),
            Some(PathBuf::from("/tmp/with space"))
        );
    }

    #[test]
    fn lists_mount_points() {
        let mounts = mount_points(SAMPLE);
        assert_eq!(mounts.len(), 5);
        assert!(mounts.contains(&PathBuf::from("/sys/fs/cgroup/memory")));
    }

    #[test]
    fn scratch_dir_is_not_a_mount_point() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!is_mount_point(&dir.path().join("merged")).expect("read mountinfo"));
    }

    #[test]
    fn mounts_below_matches_whole_components() {
        let table = "\
50 30 0:40 / /var/lib/minibox/overlay2/1/merged rw - overlay overlay rw
51 50 8:1 /data /var/lib/minibox/overlay2/1/merged/data rw - ext4 /dev/sda1 rw
52 30 0:41 / /var/lib/minibox/overlay2/12/merged rw - overlay overlay rw";
        let mounts = mounts_below(table, Path::new("/var/lib/minibox/overlay2/1"));
        assert_eq!(
            mounts,
            [
                PathBuf::from("/var/lib/minibox/overlay2/1/merged"),
                PathBuf::from("/var/lib/minibox/overlay2/1/merged/data"),
            ]
        );
    }

    #[test]
    fn relative_path_to_a_mount_is_recognized() {
        let cwd = std::env::current_dir().expect("cwd");
        let up = "../".repeat(cwd.components().count());
        assert!(is_mount_point(&Path::new(&up).join("proc")).expect("read mountinfo"));
    }

    #[test]
    fn symlinked_path_to_a_mount_is_recognized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = dir.path().join("host");
        std::os::unix::fs::symlink("/", &link).expect("symlink");
        assert!(is_mount_point(&link.join("proc")).expect("read mountinfo"));
        assert!(!active_mounts_below(&link.join("proc")).expect("read mountinfo").is_empty());
    }

    #[test]
    fn missing_path_has_no_mounts() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(active_mounts_below(&dir.path().join("gone")).expect("read mountinfo").is_empty());
    }

    #[test]
    fn missing_mountinfo_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_mount_point(&dir.path().join("nope"), "memory").is_err());
    }
}
