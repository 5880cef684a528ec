//! `OverlayFS` management for layered container filesystems.
//!
//! A read-only image layer sits below a per-container writable layer; the
//! union is exposed at the merged directory and becomes the container root.

use std::path::{Path, PathBuf};

use minibox_common::error::{MiniboxError, Result};

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Read-only lower layers (bottom to top).
    pub lower_dirs: Vec<PathBuf>,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Builds the `mount(2)` data string for this overlay.
    #[must_use]
    pub fn mount_options(&self) -> String {
        let lowers = self
            .lower_dirs
            .iter()
            .rev()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        format!(
            "lowerdir={},upperdir={},workdir={}",
            lowers,
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }

    /// Creates the upper, work and merged directories if they are missing.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in [&self.upper_dir, &self.work_dir, &self.merged_dir] {
            std::fs::create_dir_all(dir).map_err(|e| MiniboxError::io(dir, e))?;
        }
        Ok(())
    }

    /// Checks that the layers are ready to be mounted: every lower layer has
    /// content and the upper and work directories are empty.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::Config` naming the first directory that violates this.
    pub fn validate(&self) -> Result<()> {
        if self.lower_dirs.is_empty() {
            return Err(MiniboxError::Config {
                message: "overlay needs at least one lower layer".into(),
            });
        }
        for lower in &self.lower_dirs {
            if is_empty_dir(lower)? {
                return Err(MiniboxError::Config {
                    message: format!("lower layer {} is empty", lower.display()),
                });
            }
        }
        for dir in [&self.upper_dir, &self.work_dir] {
            if !is_empty_dir(dir)? {
                return Err(MiniboxError::Config {
                    message: format!("{} must be empty before mounting", dir.display()),
                });
            }
        }
        Ok(())
    }
}

/// A missing directory counts as empty.
fn is_empty_dir(dir: &Path) -> Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(MiniboxError::io(dir, e)),
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the upper, work, and merged directories if they do not exist,
/// validates the layers, then issues the `mount(2)` syscall.
///
/// # Errors
///
/// Returns an error if directory creation, validation or the mount fails.
#[cfg(target_os = "linux")]
pub fn mount_overlay(config: &OverlayConfig) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    config.create_dirs()?;
    config.validate()?;
    let opts = config.mount_options();

    mount(
        Some("overlay"),
        &config.merged_dir,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )
    .map_err(|e| MiniboxError::PermissionDenied {
        message: format!("overlay mount failed: {e}"),
    })?;

    tracing::info!(merged = %config.merged_dir.display(), "overlayfs mounted");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; `OverlayFS` mounting requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_overlay(_config: &OverlayConfig) -> Result<()> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}

/// Unmounts an `OverlayFS` at the given path with `MNT_DETACH`.
///
/// # Errors
///
/// Returns an error if the unmount fails.
pub fn unmount_overlay(merged_dir: &Path) -> Result<()> {
    super::mount::detach(merged_dir)?;
    tracing::info!(path = %merged_dir.display(), "overlayfs unmounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> OverlayConfig {
        OverlayConfig {
            lower_dirs: vec![dir.join("lower")],
            upper_dir: dir.join("upper"),
            work_dir: dir.join("work"),
            merged_dir: dir.join("merged"),
        }
    }

    #[test]
    fn mount_options_list_every_layer() {
        let config = config_in(Path::new("/o"));
        assert_eq!(
            config.mount_options(),
            "lowerdir=/o/lower,upperdir=/o/upper,workdir=/o/work"
        );
    }

    #[test]
    fn topmost_lower_comes_first() {
        let mut config = config_in(Path::new("/o"));
        config.lower_dirs = vec!["/o/base".into(), "/o/top".into()];
        assert!(config.mount_options().starts_with("lowerdir=/o/top:/o/base,"));
    }

    #[test]
    fn validate_rejects_empty_lower() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::create_dir(dir.path().join("lower")).expect("mkdir");
        config.create_dirs().expect("dirs");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_dirty_upper() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::create_dir(dir.path().join("lower")).expect("mkdir");
        std::fs::write(dir.path().join("lower/bin"), "").expect("write");
        config.create_dirs().expect("dirs");
        std::fs::write(dir.path().join("upper/stale"), "").expect("write");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_fresh_layers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::create_dir(dir.path().join("lower")).expect("mkdir");
        std::fs::write(dir.path().join("lower/bin"), "").expect("write");
        config.create_dirs().expect("dirs");
        config.validate().expect("valid");
    }
}
