//! Runtime configuration and on-disk layout.
//!
//! Every path the runtime touches is derived from a single root directory so
//! that tests and alternative installs can relocate the whole state tree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MiniboxError, Result};

/// Root configuration for the minibox runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base directory for minibox state and data.
    pub root: PathBuf,
    /// Cgroup name shared by every container of this runtime.
    #[serde(default = "default_cgroup_name")]
    pub cgroup_name: String,
}

fn default_cgroup_name() -> String {
    constants::DEFAULT_CGROUP_NAME.to_string()
}

/// Overrides read from `<root>/config.json`.
#[derive(Debug, Default, Deserialize)]
struct FileOverrides {
    cgroup_name: Option<String>,
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(root) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::path::absolute(root).map_err(|e| MiniboxError::io(root, e))
        }
        Err(e) => Err(MiniboxError::io(root, e)),
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::with_root(constants::root_dir().clone())
    }
}

impl RuntimeConfig {
    /// Creates a configuration rooted at `root` with default settings.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cgroup_name: default_cgroup_name(),
        }
    }

    /// Loads the configuration for `root`, applying `<root>/config.json` if present.
    ///
    /// `root` is made absolute, with symlinks resolved when it exists, so
    /// derived paths compare equal to the entries of the mount table.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be resolved, or the override file
    /// exists but cannot be read or parsed.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self::with_root(resolve_root(&root.into())?);
        let path = config.root.join(constants::CONFIG_FILE);
        if !path.exists() {
            return Ok(config);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| MiniboxError::io(&path, e))?;
        let overrides: FileOverrides = serde_json::from_str(&content)?;
        if let Some(name) = overrides.cgroup_name.filter(|n| !n.is_empty()) {
            config.cgroup_name = name;
        }
        tracing::debug!(path = %path.display(), "applied config overrides");
        Ok(config)
    }

    /// Directory holding one metadata directory per container.
    #[must_use]
    pub fn containers_dir(&self) -> PathBuf {
        self.root.join(constants::CONTAINERS_DIR)
    }

    /// Metadata directory of one container.
    #[must_use]
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.containers_dir().join(id)
    }

    /// `config.json` of one container.
    #[must_use]
    pub fn container_config_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(constants::CONFIG_FILE)
    }

    /// Detached-run log file of one container.
    #[must_use]
    pub fn container_log_path(&self, id: &str) -> PathBuf {
        self.container_dir(id)
            .join(format!("{id}{}", constants::LOG_SUFFIX))
    }

    /// Root of all overlay layer directories.
    #[must_use]
    pub fn overlay_dir(&self) -> PathBuf {
        self.root.join(constants::OVERLAY_DIR)
    }

    /// Directory holding image archives.
    #[must_use]
    pub fn image_dir(&self) -> PathBuf {
        self.root.join(constants::IMAGE_DIR)
    }

    /// Archive path of the named image.
    #[must_use]
    pub fn image_archive(&self, image: &str) -> PathBuf {
        self.image_dir()
            .join(format!("{image}.{}", constants::IMAGE_EXTENSION))
    }

    /// Directory holding one JSON file per network.
    #[must_use]
    pub fn networks_dir(&self) -> PathBuf {
        self.root.join(constants::NETWORK_DIR).join("network")
    }

    /// File holding the subnet allocation table.
    #[must_use]
    pub fn ipam_file(&self) -> PathBuf {
        self.root
            .join(constants::NETWORK_DIR)
            .join("ipam")
            .join("subnet.json")
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_root() {
        let config = RuntimeConfig::with_root("/srv/mb");
        assert_eq!(
            config.container_config_path("0123456789"),
            PathBuf::from("/srv/mb/containers/0123456789/config.json")
        );
        assert_eq!(
            config.container_log_path("0123456789"),
            PathBuf::from("/srv/mb/containers/0123456789/0123456789-json.log")
        );
        assert_eq!(
            config.image_archive("busybox"),
            PathBuf::from("/srv/mb/image/busybox.tar")
        );
        assert_eq!(
            config.ipam_file(),
            PathBuf::from("/srv/mb/network/ipam/subnet.json")
        );
        assert_eq!(
            config.networks_dir(),
            PathBuf::from("/srv/mb/network/network")
        );
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RuntimeConfig::load(dir.path()).expect("load");
        assert_eq!(config.cgroup_name, constants::DEFAULT_CGROUP_NAME);
        assert_eq!(config.root(), std::fs::canonicalize(dir.path()).expect("canonicalize"));
    }

    #[test]
    fn load_resolves_symlinked_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real");
        std::fs::create_dir(&real).expect("mkdir");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        let config = RuntimeConfig::load(&link).expect("load");
        assert_eq!(config.root(), std::fs::canonicalize(&real).expect("canonicalize"));
    }

    #[test]
    fn load_makes_missing_relative_root_absolute() {
        let config = RuntimeConfig::load("not-created-yet/minibox").expect("load");
        assert!(config.root().is_absolute());
        assert!(config.overlay_dir().ends_with("not-created-yet/minibox/overlay2"));
    }

    #[test]
    fn load_applies_cgroup_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"cgroup_name":"custom"}"#,
        )
        .expect("write");
        let config = RuntimeConfig::load(dir.path()).expect("load");
        assert_eq!(config.cgroup_name, "custom");
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("config.json"), "{").expect("write");
        assert!(RuntimeConfig::load(dir.path()).is_err());
    }
}
