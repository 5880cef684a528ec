//! Image archive handling.
//!
//! An image is a single tar archive of a root filesystem. It is unpacked into
//! the shared lower layer, and a container root can be packed back into a new
//! archive.

use std::fs::File;
use std::path::Path;

use minibox_common::error::{MiniboxError, Result};

/// Summary of an unpacked archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    /// Size of the archive in bytes.
    pub size_bytes: u64,
    /// Number of entries unpacked.
    pub entries: usize,
}

/// Extracts a tar archive to the target directory.
///
/// Supports both plain `.tar` and gzip-compressed `.tar.gz` / `.tgz` archives.
///
/// # Errors
///
/// Returns `MiniboxError::NotFound` if the archive does not exist, or an I/O
/// error if extraction fails.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<Layer> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );

    let file = match File::open(archive_path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MiniboxError::NotFound {
                kind: "image archive",
                id: archive_path.display().to_string(),
            });
        }
        Err(e) => return Err(MiniboxError::io(archive_path, e)),
    };
    let size_bytes = file
        .metadata()
        .map_err(|e| MiniboxError::io(archive_path, e))?
        .len();

    std::fs::create_dir_all(target).map_err(|e| MiniboxError::io(target, e))?;

    let entries = if is_gzip_archive(archive_path) {
        unpack(tar::Archive::new(flate2::read::GzDecoder::new(file)), target)?
    } else {
        unpack(tar::Archive::new(file), target)?
    };

    tracing::info!(size = size_bytes, entries, "layer extracted");
    Ok(Layer {
        size_bytes,
        entries,
    })
}

fn unpack<R: std::io::Read>(mut archive: tar::Archive<R>, target: &Path) -> Result<usize> {
    archive.set_preserve_permissions(true);
    let mut count = 0;
    for entry in archive.entries().map_err(|e| MiniboxError::io(target, e))? {
        let mut entry = entry.map_err(|e| MiniboxError::io(target, e))?;
        let _ = entry
            .unpack_in(target)
            .map_err(|e| MiniboxError::io(target, e))?;
        count += 1;
    }
    Ok(count)
}

/// Packs the contents of `source` into a new tar archive at `archive_path`.
///
/// Symlinks are stored as links. An existing archive is never overwritten.
///
/// # Errors
///
/// Returns `MiniboxError::Config` if the archive already exists, or an I/O
/// error if reading the tree or writing the archive fails.
pub fn pack_directory(source: &Path, archive_path: &Path) -> Result<()> {
    if archive_path.exists() {
        return Err(MiniboxError::Config {
            message: format!("image archive {} already exists", archive_path.display()),
        });
    }
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MiniboxError::io(parent, e))?;
    }

    let file = File::create_new(archive_path).map_err(|e| MiniboxError::io(archive_path, e))?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", source)
        .map_err(|e| MiniboxError::io(source, e))?;
    builder
        .into_inner()
        .and_then(|file| file.sync_all())
        .map_err(|e| MiniboxError::io(archive_path, e))?;

    tracing::info!(
        source = %source.display(),
        archive = %archive_path.display(),
        "directory packed"
    );
    Ok(())
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}
