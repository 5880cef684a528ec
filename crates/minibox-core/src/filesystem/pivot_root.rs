//! Root filesystem switching via `pivot_root(2)`.
//!
//! `pivot_root` requires the new root to be a mount point distinct from the
//! current root, so the new root is first bind-mounted onto itself. The old
//! root lands in a temporary directory that is detached and removed.

use std::path::Path;

use minibox_common::error::{MiniboxError, Result};

/// Directory, relative to the new root, that briefly holds the old root.
pub const PUT_OLD: &str = ".pivot_root";

/// Makes `new_root` the root of the calling process's mount namespace.
///
/// After this returns the working directory is `/` and the old root is gone.
///
/// # Errors
///
/// Returns an error if any mount, `pivot_root(2)`, `chdir` or cleanup step fails.
#[cfg(target_os = "linux")]
pub fn pivot_root(new_root: &Path) -> Result<()> {
    use super::mount::{bind_mount, detach};

    tracing::debug!(new_root = %new_root.display(), "performing pivot_root");
    bind_mount(new_root, new_root)?;

    let put_old = new_root.join(PUT_OLD);
    if !put_old.exists() {
        std::fs::create_dir(&put_old).map_err(|e| MiniboxError::io(&put_old, e))?;
    }

    nix::unistd::pivot_root(new_root, &put_old).map_err(|e| MiniboxError::PermissionDenied {
        message: format!("pivot_root to {} failed: {e}", new_root.display()),
    })?;
    nix::unistd::chdir("/").map_err(|e| MiniboxError::PermissionDenied {
        message: format!("chdir / failed: {e}"),
    })?;

    let old_root = Path::new("/").join(PUT_OLD);
    detach(&old_root)?;
    std::fs::remove_dir(&old_root).map_err(|e| MiniboxError::io(&old_root, e))?;
    tracing::info!(new_root = %new_root.display(), "root switched");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error; `pivot_root` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn pivot_root(_new_root: &Path) -> Result<()> {
    Err(MiniboxError::Config {
        message: "Linux required for native container operations".into(),
    })
}
