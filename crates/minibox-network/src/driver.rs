//! Network drivers and the registry that ties them to persisted state.

use std::fmt;
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use minibox_common::config::RuntimeConfig;
use minibox_common::error::{MiniboxError, Result};
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeDriver;
use crate::ipam::Ipam;
use crate::model::{Endpoint, Network, NetworkStore};

/// Kind of driver managing a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Linux bridge with NAT to the host's uplinks.
    Bridge,
}

impl Driver {
    /// Every supported driver.
    pub const ALL: [Self; 1] = [Self::Bridge];

    /// Name used on the command line and in network files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Driver {
    type Err = MiniboxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| MiniboxError::NotFound {
                kind: "network driver",
                id: s.to_string(),
            })
    }
}

/// Drivers and the shared network state, built once per invocation and
/// passed by reference to whatever needs them.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    store: NetworkStore,
    ipam: Ipam,
    bridge: BridgeDriver,
}

impl NetworkRegistry {
    /// Creates a registry over an explicit store and allocator.
    #[must_use]
    pub fn new(store: NetworkStore, ipam: Ipam) -> Self {
        Self {
            store,
            ipam,
            bridge: BridgeDriver,
        }
    }

    /// Creates a registry laid out under the runtime root.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            NetworkStore::new(config.networks_dir()),
            Ipam::new(config.ipam_file()),
        )
    }

    /// The network store.
    #[must_use]
    pub const fn store(&self) -> &NetworkStore {
        &self.store
    }

    /// The address allocator.
    #[must_use]
    pub const fn ipam(&self) -> &Ipam {
        &self.ipam
    }

    /// Creates network `name` on `subnet` with `driver` and persists it.
    ///
    /// The first address of the subnet becomes the gateway. If the driver
    /// fails the gateway is released again.
    ///
    /// # Errors
    ///
    /// Returns an error if the subnet does not parse, the name is taken, no
    /// address is left, or the driver fails.
    pub fn create_network(&self, driver: Driver, subnet: &str, name: &str) -> Result<Network> {
        let subnet: Ipv4Network = subnet.parse().map_err(|e| MiniboxError::Config {
            message: format!("invalid subnet {subnet:?}: {e}"),
        })?;
        if self.store.load(name).is_ok() {
            return Err(MiniboxError::Config {
                message: format!("network {name} already exists"),
            });
        }

        let gateway_ip = self.ipam.allocate(&subnet)?;
        let gateway = Ipv4Network::new(gateway_ip, subnet.prefix()).map_err(|e| {
            MiniboxError::Config {
                message: format!("invalid gateway {gateway_ip}: {e}"),
            }
        })?;

        let network = match driver {
            Driver::Bridge => self.bridge.create(name, gateway),
        };
        let network = match network {
            Ok(network) => network,
            Err(e) => {
                if let Err(release) = self.ipam.release(&subnet, gateway_ip) {
                    tracing::warn!(network = name, error = %release, "gateway not released");
                }
                return Err(e);
            }
        };

        self.store.save(&network)?;
        tracing::info!(network = name, ip_range = %network.ip_range, %driver, "network created");
        Ok(network)
    }

    /// Lists every persisted network.
    ///
    /// # Errors
    ///
    /// Returns an error if the network directory cannot be read.
    pub fn list_networks(&self) -> Result<Vec<Network>> {
        self.store.list()
    }

    /// Loads network `name`.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::NotFound` if it does not exist.
    pub fn network(&self, name: &str) -> Result<Network> {
        self.store.load(name)
    }

    /// Releases the gateway, removes the driver's devices and deletes the
    /// file of network `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the network does not exist or a step fails.
    pub fn remove_network(&self, name: &str) -> Result<()> {
        let network = self.store.load(name)?;
        self.ipam.release(&network.subnet(), network.gateway())?;
        match network.driver {
            Driver::Bridge => self.bridge.delete(&network)?,
        }
        self.store.delete(name)?;
        tracing::info!(network = name, "network removed");
        Ok(())
    }

    /// Asks the network's driver to connect `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        match endpoint.network.driver {
            Driver::Bridge => self.bridge.connect(&endpoint.network, endpoint),
        }
    }

    /// Asks the network's driver to disconnect `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn disconnect(&self, endpoint: &Endpoint) -> Result<()> {
        match endpoint.network.driver {
            Driver::Bridge => self.bridge.disconnect(&endpoint.network, endpoint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_in(dir: &std::path::Path) -> NetworkRegistry {
        NetworkRegistry::from_config(&RuntimeConfig::with_root(dir))
    }

    #[test]
    fn driver_parses_by_name() {
        assert_eq!("bridge".parse::<Driver>().unwrap(), Driver::Bridge);
        assert!(matches!(
            "overlay".parse::<Driver>(),
            Err(MiniboxError::NotFound { kind: "network driver", .. })
        ));
    }

    #[test]
    fn bad_subnet_allocates_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        assert!(registry.create_network(Driver::Bridge, "not-a-cidr", "br0").is_err());
        assert!(!registry.ipam().path().exists());
    }

    #[test]
    fn duplicate_name_is_rejected_before_allocation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        registry
            .store()
            .save(&Network {
                name: "br0".into(),
                ip_range: "10.9.0.1/24".parse().unwrap(),
                driver: Driver::Bridge,
            })
            .unwrap();
        assert!(registry.create_network(Driver::Bridge, "10.9.0.0/24", "br0").is_err());
        assert!(!registry.ipam().path().exists());
    }

    #[test]
    fn removing_unknown_network_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = registry_in(dir.path());
        assert!(matches!(
            registry.remove_network("ghost"),
            Err(MiniboxError::NotFound { .. })
        ));
        assert!(registry.list_networks().unwrap().is_empty());
    }
}
