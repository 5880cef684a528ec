//! Mount utilities for container filesystem setup.
//!
//! Covers mount propagation, the `/proc` and `/dev` mounts performed inside
//! the container, and host-side bind mounts for volumes.

use std::path::Path;

use minibox_common::error::{MiniboxError, Result};

#[cfg(target_os = "linux")]
use nix::mount::{MntFlags, MsFlags, mount, umount2};

/// Marks every mount under `/` as private so later mounts stay in this namespace.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn make_root_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| MiniboxError::PermissionDenied {
        message: format!("make / private failed: {e}"),
    })?;
    tracing::debug!("root mount propagation set to private");
    Ok(())
}

/// Mounts a fresh `proc` at `/proc`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn mount_proc() -> Result<()> {
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None::<&str>,
    )
    .map_err(|e| MiniboxError::PermissionDenied {
        message: format!("mount /proc failed: {e}"),
    })?;
    tracing::debug!("/proc mounted");
    Ok(())
}

/// Mounts a `tmpfs` at `/dev` with mode 0755.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn mount_dev() -> Result<()> {
    mount(
        Some("tmpfs"),
        "/dev",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(|e| MiniboxError::PermissionDenied {
        message: format!("mount /dev failed: {e}"),
    })?;
    tracing::debug!("/dev mounted");
    Ok(())
}

/// Recursively bind-mounts `source` onto `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| MiniboxError::PermissionDenied {
        message: format!(
            "bind mount {} -> {} failed: {e}",
            source.display(),
            target.display()
        ),
    })?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "bind mount created"
    );
    Ok(())
}

/// Lazily detaches whatever is mounted at `target`.
///
/// # Errors
///
/// Returns an error if the `umount2(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn detach(target: &Path) -> Result<()> {
    umount2(target, MntFlags::MNT_DETACH).map_err(|e| MiniboxError::PermissionDenied {
        message: format!("unmount {} failed: {e}", target.display()),
    })?;
    tracing::debug!(target = %target.display(), "unmounted");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> MiniboxError {
    MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; mount propagation requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_root_private() -> Result<()> {
    Err(unsupported())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; mounting `/proc` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_proc() -> Result<()> {
    Err(unsupported())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; mounting `/dev` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_dev() -> Result<()> {
    Err(unsupported())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; bind mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn bind_mount(_source: &Path, _target: &Path) -> Result<()> {
    Err(unsupported())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; unmounting requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn detach(_target: &Path) -> Result<()> {
    Err(unsupported())
}
