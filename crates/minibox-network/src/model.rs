//! Networks, endpoints and their persistence.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnetwork::Ipv4Network;
use minibox_common::error::{MiniboxError, Result};
use serde::{Deserialize, Serialize};

use crate::driver::Driver;

/// Characters of the container id used in interface names.
const VETH_ID_LEN: usize = 5;

/// A named virtual network.
///
/// `ip_range` carries the gateway address together with the subnet prefix,
/// for example `172.18.0.1/24`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network name; also the bridge device name.
    pub name: String,
    /// Gateway address and prefix.
    #[serde(rename = "ipRange")]
    pub ip_range: Ipv4Network,
    /// Driver that manages the network.
    #[serde(rename = "driverName")]
    pub driver: Driver,
}

impl Network {
    /// Gateway address of the network.
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.ip_range.ip()
    }

    /// Subnet in network-address form.
    #[must_use]
    pub fn subnet(&self) -> Ipv4Network {
        Ipv4Network::new(self.ip_range.network(), self.ip_range.prefix()).unwrap_or(self.ip_range)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.ip_range, self.driver)
    }
}

/// Host and peer ends of a container's veth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// End attached to the bridge on the host.
    pub host: String,
    /// End moved into the container.
    pub peer: String,
}

impl VethPair {
    /// Derives the interface names for container `id`.
    #[must_use]
    pub fn for_container(id: &str) -> Self {
        let short: String = id.chars().take(VETH_ID_LEN).collect();
        Self {
            peer: format!("cif-{short}"),
            host: short,
        }
    }
}

/// A container's attachment to a network. Rebuilt on every attach.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// `<container id>-<network name>`.
    pub id: String,
    /// Veth pair of the attachment.
    pub device: VethPair,
    /// Address allocated to the container.
    pub ip_address: Ipv4Addr,
    /// MAC of the container end, once known.
    pub mac_address: Option<String>,
    /// `hostPort:containerPort` pairs to forward.
    pub port_mapping: Vec<String>,
    /// Network the endpoint belongs to.
    pub network: Network,
}

impl Endpoint {
    /// Builds the endpoint of container `container_id` on `network`.
    #[must_use]
    pub fn new(
        container_id: &str,
        network: Network,
        ip_address: Ipv4Addr,
        port_mapping: Vec<String>,
    ) -> Self {
        Self {
            id: format!("{container_id}-{}", network.name),
            device: VethPair::for_container(container_id),
            ip_address,
            mac_address: None,
            port_mapping,
            network,
        }
    }

    /// Container address with the network prefix, as given to `ip addr add`.
    #[must_use]
    pub fn address_cidr(&self) -> String {
        format!("{}/{}", self.ip_address, self.network.ip_range.prefix())
    }
}

/// One JSON file per network, named after the network.
#[derive(Debug, Clone)]
pub struct NetworkStore {
    dir: PathBuf,
}

impl NetworkStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Persists `network`, replacing any previous file of the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, network: &Network) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| MiniboxError::io(&self.dir, e))?;
        let path = self.path_of(&network.name);
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_vec(network)?;
        std::fs::write(&tmp, json).map_err(|e| MiniboxError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| MiniboxError::io(&path, e))
    }

    /// Loads the network called `name`.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::NotFound` if no such network exists.
    pub fn load(&self, name: &str) -> Result<Network> {
        let path = self.path_of(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MiniboxError::NotFound {
                    kind: "network",
                    id: name.to_string(),
                });
            }
            Err(e) => return Err(MiniboxError::io(&path, e)),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Lists every readable network, sorted by name. Unreadable files are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn list(&self) -> Result<Vec<Network>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MiniboxError::io(&self.dir, e)),
        };

        let mut networks = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MiniboxError::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().is_some_and(|ext| ext == "tmp") {
                continue;
            }
            match read_network(&path) {
                Ok(network) => networks.push(network),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping network"),
            }
        }
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(networks)
    }

    /// Removes the file of network `name`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MiniboxError::io(&path, e)),
        }
    }
}

fn read_network(path: &Path) -> Result<Network> {
    let content = std::fs::read_to_string(path).map_err(|e| MiniboxError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(name: &str, range: &str) -> Network {
        Network {
            name: name.into(),
            ip_range: range.parse().unwrap(),
            driver: Driver::Bridge,
        }
    }

    #[test]
    fn gateway_and_subnet_come_from_ip_range() {
        let net = network("br0", "172.18.0.1/24");
        assert_eq!(net.gateway(), Ipv4Addr::new(172, 18, 0, 1));
        assert_eq!(net.subnet().to_string(), "172.18.0.0/24");
    }

    #[test]
    fn network_json_uses_documented_keys() {
        let value = serde_json::to_value(network("br0", "172.18.0.1/24")).unwrap();
        assert_eq!(value["name"], "br0");
        assert_eq!(value["ipRange"], "172.18.0.1/24");
        assert_eq!(value["driverName"], "bridge");
    }

    #[test]
    fn veth_names_use_id_prefix() {
        let pair = VethPair::for_container("1234567890");
        assert_eq!(pair.host, "12345");
        assert_eq!(pair.peer, "cif-12345");
    }

    #[test]
    fn endpoint_cidr_uses_network_prefix() {
        let ep = Endpoint::new(
            "1234567890",
            network("br0", "172.18.0.1/24"),
            Ipv4Addr::new(172, 18, 0, 2),
            vec![],
        );
        assert_eq!(ep.address_cidr(), "172.18.0.2/24");
        assert_eq!(ep.id, "1234567890-br0");
    }

    #[test]
    fn store_round_trip_and_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = NetworkStore::new(dir.path().join("network"));
        store.save(&network("b", "10.0.1.1/24")).unwrap();
        store.save(&network("a", "10.0.0.1/24")).unwrap();
        std::fs::write(dir.path().join("network/broken"), "{").unwrap();

        assert_eq!(store.load("a").unwrap(), network("a", "10.0.0.1/24"));
        let names: Vec<_> = store.list().unwrap().into_iter().map(|n| n.name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn missing_network_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = NetworkStore::new(dir.path());
        assert!(matches!(
            store.load("ghost"),
            Err(MiniboxError::NotFound { kind: "network", .. })
        ));
        store.delete("ghost").unwrap();
        assert!(NetworkStore::new(dir.path().join("absent")).list().unwrap().is_empty());
    }
}
