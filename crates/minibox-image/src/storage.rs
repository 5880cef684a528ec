//! Layered storage for container root filesystems.
//!
//! Each image is unpacked once into a shared read-only lower layer under
//! `<overlay>/<image>/lower`. Each container gets its own
//! `<overlay>/<id>/{upper,work,merged}`; the merged directory is the
//! container root.

use std::path::{Path, PathBuf};

use minibox_common::config::RuntimeConfig;
use minibox_common::error::{MiniboxError, Result};
use minibox_core::filesystem::mount::{bind_mount, detach};
use minibox_core::filesystem::mountinfo::{active_mounts_below, is_mount_point};
use minibox_core::filesystem::overlayfs::{OverlayConfig, mount_overlay, unmount_overlay};

use crate::volume::VolumeSpec;

/// Directories that make up one container's root filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayers {
    /// Shared read-only image layer.
    pub lower: PathBuf,
    /// Writable layer.
    pub upper: PathBuf,
    /// `OverlayFS` work directory.
    pub work: PathBuf,
    /// Union mount point and container root.
    pub merged: PathBuf,
    /// Per-container directory holding upper, work and merged.
    pub root: PathBuf,
}

impl StorageLayers {
    fn overlay(&self) -> OverlayConfig {
        OverlayConfig {
            lower_dirs: vec![self.lower.clone()],
            upper_dir: self.upper.clone(),
            work_dir: self.work.clone(),
            merged_dir: self.merged.clone(),
        }
    }
}

/// Builds and tears down container root filesystems.
#[derive(Debug, Clone)]
pub struct LayeredStorage {
    overlay_dir: PathBuf,
    image_dir: PathBuf,
}

impl LayeredStorage {
    /// Creates a storage manager over explicit directories.
    #[must_use]
    pub fn new(overlay_dir: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            overlay_dir: overlay_dir.into(),
            image_dir: image_dir.into(),
        }
    }

    /// Creates a storage manager laid out under the runtime root.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.overlay_dir(), config.image_dir())
    }

    /// Shared lower layer of `image`.
    #[must_use]
    pub fn lower_dir(&self, image: &str) -> PathBuf {
        self.overlay_dir.join(image).join("lower")
    }

    /// Archive of `image`.
    #[must_use]
    pub fn image_archive(&self, image: &str) -> PathBuf {
        self.image_dir.join(format!("{image}.tar"))
    }

    /// Layer paths of container `id` built from `image`.
    #[must_use]
    pub fn layers(&self, id: &str, image: &str) -> StorageLayers {
        let root = self.overlay_dir.join(id);
        StorageLayers {
            lower: self.lower_dir(image),
            upper: root.join("upper"),
            work: root.join("work"),
            merged: root.join("merged"),
            root,
        }
    }

    /// Merged root of container `id`.
    #[must_use]
    pub fn merged_dir(&self, id: &str) -> PathBuf {
        self.overlay_dir.join(id).join("merged")
    }

    /// Unpacks the archive of `image` into its lower layer unless already present.
    ///
    /// Extraction goes to a staging directory renamed into place on success, so
    /// a failed extraction is retried on the next call.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::NotFound` if the archive is missing, or an I/O
    /// error if extraction fails.
    pub fn ensure_lower(&self, image: &str) -> Result<PathBuf> {
        let lower = self.lower_dir(image);
        if lower.exists() {
            tracing::debug!(image, lower = %lower.display(), "reusing image layer");
            return Ok(lower);
        }

        let staging = lower.with_extension("partial");
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| MiniboxError::io(&staging, e))?;
        }
        let result = crate::layer::extract_layer(&self.image_archive(image), &staging);
        if let Err(e) = result {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
        std::fs::rename(&staging, &lower).map_err(|e| MiniboxError::io(&lower, e))?;
        Ok(lower)
    }

    /// Materializes the root filesystem of container `id`.
    ///
    /// The volume spec is validated before anything touches the disk. The
    /// host side of a volume is created if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume spec is malformed, the image is missing,
    /// or a directory or mount operation fails. A failed overlay or volume
    /// mount removes everything created for `id`.
    pub fn prepare(&self, id: &str, image: &str, volume: &str) -> Result<StorageLayers> {
        let volume = VolumeSpec::parse_optional(volume)?;
        let _ = self.ensure_lower(image)?;

        let layers = self.layers(id, image);
        if let Err(e) = mount_overlay(&layers.overlay()) {
            let _ = self.teardown(id, "");
            return Err(e);
        }

        if let Some(spec) = &volume {
            if let Err(e) = mount_volume(&layers.merged, spec) {
                let _ = self.teardown(id, "");
                return Err(e);
            }
        }

        tracing::info!(id, image, merged = %layers.merged.display(), "workspace ready");
        Ok(layers)
    }

    /// Removes the root filesystem of container `id`.
    ///
    /// Every step is attempted: unmount the volume, unmount the overlay, then
    /// delete the per-container directories. Failures are logged and returned;
    /// targets that are already gone are not failures. The directories are
    /// kept if anything is still mounted below them.
    pub fn teardown(&self, id: &str, volume: &str) -> Vec<MiniboxError> {
        let mut failures = Vec::new();
        let root = self.overlay_dir.join(id);
        let merged = root.join("merged");

        match VolumeSpec::parse_optional(volume) {
            Ok(Some(spec)) => {
                let target = spec.target_in(&merged);
                if let Err(e) = unmount_if_mounted(&target, detach) {
                    failures.push(e);
                }
            }
            Ok(None) => {}
            Err(e) => failures.push(e),
        }

        if let Err(e) = unmount_if_mounted(&merged, unmount_overlay) {
            failures.push(e);
        }

        match active_mounts_below(&root) {
            Ok(mounts) if mounts.is_empty() => match std::fs::remove_dir_all(&root) {
                Ok(()) => tracing::debug!(path = %root.display(), "workspace removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => failures.push(MiniboxError::io(&root, e)),
            },
            Ok(mounts) => failures.push(MiniboxError::InvalidState {
                id: id.to_string(),
                message: format!(
                    "{} still mounted under {}, workspace kept",
                    mounts.len(),
                    root.display()
                ),
            }),
            Err(e) => failures.push(e),
        }

        for failure in &failures {
            tracing::error!(id, error = %failure, "workspace teardown step failed");
        }
        failures
    }
}

fn mount_volume(merged: &Path, spec: &VolumeSpec) -> Result<()> {
    std::fs::create_dir_all(&spec.host).map_err(|e| MiniboxError::io(&spec.host, e))?;
    let target = spec.target_in(merged);
    std::fs::create_dir_all(&target).map_err(|e| MiniboxError::io(&target, e))?;
    bind_mount(&spec.host, &target)?;
    tracing::info!(
        host = %spec.host.display(),
        container = %spec.container.display(),
        "volume mounted"
    );
    Ok(())
}

fn unmount_if_mounted(path: &Path, unmount: fn(&Path) -> Result<()>) -> Result<()> {
    if !path.exists() || !is_mount_point(path)? {
        return Ok(());
    }
    unmount(path)
}
