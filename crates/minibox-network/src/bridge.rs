//! Linux bridge network driver.
//!
//! A network is a bridge device named after the network, holding the
//! gateway address, with outbound traffic from its subnet masqueraded.
//! Containers join through a veth pair whose host end is enslaved to the
//! bridge.

use ipnetwork::Ipv4Network;
use minibox_common::error::{MiniboxError, Result};

use crate::command::{ip, iptables};
use crate::driver::Driver;
use crate::model::{Endpoint, Network};

/// Driver for [`Driver::Bridge`] networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeDriver;

impl BridgeDriver {
    /// Creates the bridge for a network whose gateway is `gateway`
    /// (address and prefix) and returns the network description.
    ///
    /// An existing device of the same name is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if any `ip` or `iptables` step fails.
    pub fn create(self, name: &str, gateway: Ipv4Network) -> Result<Network> {
        if link_exists(name) {
            return Err(MiniboxError::Config {
                message: format!("network device {name} already exists"),
            });
        }
        let network = Network {
            name: name.to_string(),
            ip_range: gateway,
            driver: Driver::Bridge,
        };

        let gateway_cidr = gateway.to_string();
        let _ = ip(&["link", "add", "name", name, "type", "bridge"])?;
        let _ = ip(&["addr", "add", gateway_cidr.as_str(), "dev", name])?;
        let _ = ip(&["link", "set", name, "up"])?;
        iptables(&masquerade_rule("-A", &network))?;

        tracing::info!(network = name, gateway = %gateway, "bridge created");
        Ok(network)
    }

    /// Removes the masquerade rule and the bridge device of `network`.
    ///
    /// A missing rule is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge device cannot be deleted.
    pub fn delete(self, network: &Network) -> Result<()> {
        if let Err(e) = iptables(&masquerade_rule("-D", network)) {
            tracing::warn!(network = %network.name, error = %e, "masquerade rule not removed");
        }
        let _ = ip(&["link", "delete", network.name.as_str(), "type", "bridge"])?;
        tracing::info!(network = %network.name, "bridge deleted");
        Ok(())
    }

    /// Creates the veth pair of `endpoint`, enslaves its host end to the
    /// bridge and brings that end up.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge is missing or an `ip` step fails.
    pub fn connect(self, network: &Network, endpoint: &Endpoint) -> Result<()> {
        if !link_exists(&network.name) {
            return Err(MiniboxError::NotFound {
                kind: "bridge device",
                id: network.name.clone(),
            });
        }
        let veth = &endpoint.device;
        let (host, peer) = (veth.host.as_str(), veth.peer.as_str());
        let _ = ip(&["link", "add", host, "type", "veth", "peer", "name", peer])?;
        let _ = ip(&["link", "set", host, "master", network.name.as_str()])?;
        let _ = ip(&["link", "set", host, "up"])?;
        tracing::info!(
            network = %network.name,
            veth = %veth.host,
            peer = %veth.peer,
            "endpoint connected"
        );
        Ok(())
    }

    /// Detaches the host end of `endpoint` from the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the `ip` invocation fails.
    pub fn disconnect(self, network: &Network, endpoint: &Endpoint) -> Result<()> {
        let _ = ip(&nomaster_args(endpoint))?;
        tracing::info!(network = %network.name, veth = %endpoint.device.host, "endpoint disconnected");
        Ok(())
    }
}

/// `ip` arguments removing the bridge master of the host end, keeping the
/// device itself.
fn nomaster_args(endpoint: &Endpoint) -> [&str; 4] {
    ["link", "set", endpoint.device.host.as_str(), "nomaster"]
}

fn link_exists(name: &str) -> bool {
    ip(&["link", "show", name]).is_ok()
}

/// `iptables` arguments appending (`-A`) or deleting (`-D`) the rule that
/// masquerades traffic leaving the subnet of `network` through other devices.
fn masquerade_rule(action: &str, network: &Network) -> Vec<String> {
    vec![
        "-t".into(),
        "nat".into(),
        action.into(),
        "POSTROUTING".into(),
        "-s".into(),
        network.subnet().to_string(),
        "!".into(),
        "-o".into(),
        network.name.clone(),
        "-j".into(),
        "MASQUERADE".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masquerade_rule_targets_subnet_and_bridge() {
        let network = Network {
            name: "br0".into(),
            ip_range: "172.18.0.1/24".parse().unwrap(),
            driver: Driver::Bridge,
        };
        assert_eq!(
            masquerade_rule("-A", &network).join(" "),
            "-t nat -A POSTROUTING -s 172.18.0.0/24 ! -o br0 -j MASQUERADE"
        );
    }

    #[test]
    fn disconnect_only_clears_the_master() {
        let network = Network {
            name: "br0".into(),
            ip_range: "172.18.0.1/24".parse().unwrap(),
            driver: Driver::Bridge,
        };
        let endpoint = Endpoint::new(
            "1234567890",
            network,
            "172.18.0.2".parse().unwrap(),
            Vec::new(),
        );
        assert_eq!(nomaster_args(&endpoint), ["link", "set", "12345", "nomaster"]);
    }

    #[test]
    fn unknown_device_does_not_exist() {
        assert!(!link_exists("mbx-missing-9"));
    }
}
