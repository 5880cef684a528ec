//! Persistent container metadata.
//!
//! Each container has a directory `<containers>/<id>/` holding its
//! `config.json` record and, for detached runs, its log file. Records are
//! written to a temporary file and renamed into place.

use std::path::{Path, PathBuf};

use minibox_common::config::RuntimeConfig;
use minibox_common::constants::CONFIG_FILE;
use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::ContainerInfo;

/// Store of [`ContainerInfo`] records.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the store of the runtime root.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.containers_dir())
    }

    /// Directory of container `id`.
    #[must_use]
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join(CONFIG_FILE)
    }

    /// Writes `info`, replacing the previous record of the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, info: &ContainerInfo) -> Result<()> {
        let dir = self.container_dir(info.id.as_str());
        std::fs::create_dir_all(&dir).map_err(|e| MiniboxError::io(&dir, e))?;

        let path = self.record_path(info.id.as_str());
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(info)?;
        std::fs::write(&tmp, json).map_err(|e| MiniboxError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| MiniboxError::io(&path, e))?;
        tracing::debug!(id = %info.id, status = %info.status, "container record saved");
        Ok(())
    }

    /// Loads the record of container `id`.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::NotFound` if there is no such record.
    pub fn load(&self, id: &str) -> Result<ContainerInfo> {
        let path = self.record_path(id);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MiniboxError::NotFound {
                kind: "container",
                id: id.to_string(),
            }),
            Err(e) => Err(MiniboxError::io(&path, e)),
        }
    }

    /// Lists every readable record, oldest first. Unreadable records are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the containers directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<ContainerInfo>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MiniboxError::io(&self.dir, e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MiniboxError::io(&self.dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let path = entry.path().join(CONFIG_FILE);
            match read_record(&path) {
                Ok(info) => records.push(info),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping container record"),
            }
        }
        records.sort_by(|a, b| {
            a.created_time
                .cmp(&b.created_time)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(records)
    }

    /// Deletes the directory of container `id`, including its log.
    /// A missing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn delete(&self, id: &str) -> Result<()> {
        let dir = self.container_dir(id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(id, "container record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MiniboxError::io(&dir, e)),
        }
    }
}

fn read_record(path: &Path) -> Result<ContainerInfo> {
    let content = std::fs::read_to_string(path).map_err(|e| MiniboxError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minibox_common::types::{ContainerId, ContainerStatus};

    fn record(id: &str) -> ContainerInfo {
        ContainerInfo::running(ContainerId::new(id), 4242, "", &["top".into()])
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path());
        store.save(&record("1111111111")).unwrap();

        let loaded = store.load("1111111111").unwrap();
        assert_eq!(loaded.status, ContainerStatus::Running);
        assert_eq!(loaded.pid(), Some(4242));
        assert!(!dir.path().join("1111111111/config.json.tmp").exists());
    }

    #[test]
    fn save_replaces_previous_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path());
        let mut info = record("1111111111");
        store.save(&info).unwrap();
        info.status = ContainerStatus::Stopped;
        info.pid = String::new();
        store.save(&info).unwrap();

        let loaded = store.load("1111111111").unwrap();
        assert_eq!(loaded.status, ContainerStatus::Stopped);
        assert_eq!(loaded.pid(), None);
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path());
        assert!(matches!(
            store.load("0000000000"),
            Err(MiniboxError::NotFound { kind: "container", .. })
        ));
    }

    #[test]
    fn list_skips_broken_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path());
        store.save(&record("1111111111")).unwrap();
        store.save(&record("2222222222")).unwrap();
        std::fs::create_dir_all(dir.path().join("3333333333")).unwrap();
        std::fs::write(dir.path().join("3333333333/config.json"), "not json").unwrap();

        let ids: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(ids, ["1111111111", "2222222222"]);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StateStore::new(dir.path());
        store.save(&record("1111111111")).unwrap();
        store.delete("1111111111").unwrap();
        store.delete("1111111111").unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
