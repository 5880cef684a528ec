//! Domain primitive types used across the minibox workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{CONTAINER_ID_LEN, TIME_FORMAT};

/// Identifier of a container: a fixed-length string of random digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random identifier of [`CONTAINER_ID_LEN`] decimal digits.
    ///
    /// Uniqueness is not checked against existing containers.
    #[must_use]
    pub fn generate() -> Self {
        let mut entropy = uuid::Uuid::new_v4().as_u128();
        let mut id = String::with_capacity(CONTAINER_ID_LEN);
        for _ in 0..CONTAINER_ID_LEN {
            let digit = u8::try_from(entropy % 10).unwrap_or(0);
            id.push(char::from(b'0' + digit));
            entropy /= 10;
        }
        Self(id)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status persisted in a container record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// The init process is alive.
    Running,
    /// The container was stopped with a signal.
    Stopped,
    /// The init process exited on its own.
    Exited,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Resource request applied to a container's cgroup.
///
/// Empty strings and a zero quota mean "unset": the matching backend does
/// not touch its control file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory ceiling such as `100m`, `1g` or a plain byte count.
    pub memory_limit: String,
    /// Comma-separated list or range of CPU ids.
    pub cpu_set: String,
    /// CPU quota as a percentage of one core.
    pub cpu_cfs_quota: u32,
}

impl ResourceConfig {
    /// Returns `true` when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory_limit.is_empty() && self.cpu_set.is_empty() && self.cpu_cfs_quota == 0
    }
}

/// Persistent record of one container, stored as `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Host pid of the init process; blank once stopped.
    pub pid: String,
    /// Container identifier.
    pub id: ContainerId,
    /// Human-readable name (defaults to the id).
    pub name: String,
    /// Space-joined user command.
    pub command: String,
    /// Creation time, `YYYY-MM-DD HH:MM:SS` local time.
    #[serde(rename = "createTime")]
    pub created_time: String,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// Raw `host:container` volume spec, or empty.
    #[serde(default)]
    pub volume: String,
    /// `hostPort:containerPort` pairs.
    #[serde(rename = "portmapping", default)]
    pub port_mapping: Vec<String>,
    /// Image the container was created from.
    #[serde(default)]
    pub image: String,
    /// Network the container is attached to, if any.
    #[serde(rename = "networkName", default)]
    pub network: String,
    /// Address allocated on that network, if any.
    #[serde(rename = "ipAddress", default)]
    pub ip_address: String,
}

impl ContainerInfo {
    /// Creates a running record stamped with the current local time.
    #[must_use]
    pub fn running(id: ContainerId, pid: u32, name: &str, command: &[String]) -> Self {
        let name = if name.is_empty() {
            id.to_string()
        } else {
            name.to_string()
        };
        Self {
            pid: pid.to_string(),
            id,
            name,
            command: command.join(" "),
            created_time: chrono::Local::now().format(TIME_FORMAT).to_string(),
            status: ContainerStatus::Running,
            volume: String::new(),
            port_mapping: Vec::new(),
            image: String::new(),
            network: String::new(),
            ip_address: String::new(),
        }
    }

    /// Parses the stored pid, if any.
    #[must_use]
    pub fn pid(&self) -> Option<i32> {
        self.pid.trim().parse().ok().filter(|p| *p > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_ten_digits() {
        let id = ContainerId::generate();
        assert_eq!(id.as_str().len(), CONTAINER_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ContainerStatus::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
        assert_eq!(ContainerStatus::Exited.to_string(), "exited");
    }

    #[test]
    fn empty_name_defaults_to_id() {
        let info = ContainerInfo::running(
            ContainerId::new("1234567890"),
            42,
            "",
            &["top".into(), "-b".into()],
        );
        assert_eq!(info.name, "1234567890");
        assert_eq!(info.command, "top -b");
        assert_eq!(info.pid(), Some(42));
    }

    #[test]
    fn record_uses_documented_json_keys() {
        let mut info =
            ContainerInfo::running(ContainerId::new("1234567890"), 7, "web", &["sh".into()]);
        info.port_mapping = vec!["8080:80".into()];
        let value = serde_json::to_value(&info).unwrap();
        for key in ["pid", "id", "name", "command", "createTime", "status", "volume", "portmapping"] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["status"], "running");
        assert_eq!(value["pid"], "7");
    }

    #[test]
    fn blank_pid_parses_as_none() {
        let mut info = ContainerInfo::running(ContainerId::new("1"), 7, "a", &[]);
        info.pid = " ".into();
        assert_eq!(info.pid(), None);
    }

    #[test]
    fn resource_config_defaults_to_empty() {
        assert!(ResourceConfig::default().is_empty());
        let cfg = ResourceConfig {
            cpu_set: "0-1".into(),
            ..ResourceConfig::default()
        };
        assert!(!cfg.is_empty());
    }
}
