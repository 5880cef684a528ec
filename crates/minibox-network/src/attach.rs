//! Wiring a running container into a network.

use std::net::Ipv4Addr;

use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::ContainerInfo;
use minibox_core::namespace::network::run_in_netns;

use crate::command::{ip, iptables};
use crate::driver::NetworkRegistry;
use crate::model::Endpoint;

/// A parsed `hostPort:containerPort` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port on the host.
    pub host: u16,
    /// Port inside the container.
    pub container: u16,
}

impl PortMapping {
    /// Parses `host:container`; anything else is `None`.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let (host, container) = spec.split_once(':')?;
        Some(Self {
            host: host.trim().parse().ok()?,
            container: container.trim().parse().ok()?,
        })
    }

    /// `iptables` arguments forwarding TCP traffic on the host port to `ip`.
    #[must_use]
    pub fn dnat_rule(&self, ip: Ipv4Addr) -> Vec<String> {
        vec![
            "-t".into(),
            "nat".into(),
            "-A".into(),
            "PREROUTING".into(),
            "-p".into(),
            "tcp".into(),
            "-m".into(),
            "tcp".into(),
            "--dport".into(),
            self.host.to_string(),
            "-j".into(),
            "DNAT".into(),
            "--to-destination".into(),
            format!("{ip}:{}", self.container),
        ]
    }
}

/// Connects the running container `info` to `network_name`.
///
/// Allocates an address, has the driver create and enslave the veth pair,
/// configures the container end from inside the container's network
/// namespace, then installs one DNAT rule per port mapping. Malformed
/// mappings and failed rules are logged and skipped.
///
/// # Errors
///
/// Returns an error if the network is unknown, the container has no pid,
/// no address is left, or the driver or in-namespace setup fails. The
/// allocated address is released on failure.
pub fn attach(registry: &NetworkRegistry, network_name: &str, info: &ContainerInfo) -> Result<Endpoint> {
    let network = registry.network(network_name)?;
    let pid = info.pid().ok_or_else(|| MiniboxError::InvalidState {
        id: info.id.to_string(),
        message: "has no running process to attach".into(),
    })?;

    let subnet = network.subnet();
    let address = registry.ipam().allocate(&subnet)?;
    let mut endpoint = Endpoint::new(info.id.as_str(), network, address, info.port_mapping.clone());

    match wire(registry, &endpoint, pid) {
        Ok(mac) => endpoint.mac_address = mac,
        Err(e) => {
            if let Err(release) = registry.ipam().release(&subnet, address) {
                tracing::warn!(ip = %address, error = %release, "address not released");
            }
            return Err(e);
        }
    }

    install_port_mappings(&endpoint);
    tracing::info!(
        id = %info.id,
        network = network_name,
        ip = %endpoint.ip_address,
        "container attached"
    );
    Ok(endpoint)
}

/// Returns the address recorded for `info` to its network's pool.
///
/// Does nothing if the container was never attached.
///
/// # Errors
///
/// Returns an error if the network is gone or the address cannot be released.
pub fn release(registry: &NetworkRegistry, info: &ContainerInfo) -> Result<()> {
    if info.network.is_empty() || info.ip_address.is_empty() {
        return Ok(());
    }
    let network = registry.network(&info.network)?;
    let address: Ipv4Addr = info.ip_address.parse().map_err(|e| MiniboxError::Config {
        message: format!("invalid recorded address {:?}: {e}", info.ip_address),
    })?;
    registry.ipam().release(&network.subnet(), address)?;
    tracing::info!(id = %info.id, network = %info.network, ip = %address, "address released");
    Ok(())
}

fn wire(registry: &NetworkRegistry, endpoint: &Endpoint, pid: i32) -> Result<Option<String>> {
    registry.connect(endpoint)?;

    let peer = endpoint.device.peer.clone();
    let pid_arg = pid.to_string();
    let _ = ip(&["link", "set", peer.as_str(), "netns", pid_arg.as_str()])?;

    let cidr = endpoint.address_cidr();
    let gateway = endpoint.network.gateway().to_string();
    run_in_netns(pid, move || {
        let _ = ip(&["addr", "add", cidr.as_str(), "dev", peer.as_str()])?;
        let _ = ip(&["link", "set", peer.as_str(), "up"])?;
        let _ = ip(&["link", "set", "lo", "up"])?;
        let _ = ip(&[
            "route", "add", "default", "via", gateway.as_str(), "dev", peer.as_str(),
        ])?;
        let link = ip(&["-o", "link", "show", peer.as_str()])?;
        Ok(parse_mac(&link))
    })
}

/// Extracts the `link/ether` address from `ip -o link show` output.
fn parse_mac(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    let _ = words.find(|w| *w == "link/ether")?;
    words.next().map(str::to_string)
}

fn install_port_mappings(endpoint: &Endpoint) {
    for spec in &endpoint.port_mapping {
        let Some(mapping) = PortMapping::parse(spec) else {
            tracing::warn!(mapping = %spec, "ignoring malformed port mapping");
            continue;
        };
        match iptables(&mapping.dnat_rule(endpoint.ip_address)) {
            Ok(()) => tracing::debug!(host = mapping.host, container = mapping.container, "port forwarded"),
            Err(e) => tracing::error!(mapping = %spec, error = %e, "port forwarding failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minibox_common::config::RuntimeConfig;
    use minibox_common::types::ContainerId;

    #[test]
    fn port_mapping_parses_pairs() {
        assert_eq!(
            PortMapping::parse("8080:80"),
            Some(PortMapping {
                host: 8080,
                container: 80
            })
        );
        for bad in ["8080", "a:80", "80:", "1:2:3", "70000:80"] {
            assert_eq!(PortMapping::parse(bad), None, "{bad}");
        }
    }

    #[test]
    fn dnat_rule_targets_container_address() {
        let rule = PortMapping::parse("8080:80")
            .unwrap()
            .dnat_rule(Ipv4Addr::new(172, 18, 0, 2));
        assert_eq!(
            rule.join(" "),
            "-t nat -A PREROUTING -p tcp -m tcp --dport 8080 -j DNAT --to-destination 172.18.0.2:80"
        );
    }

    #[test]
    fn mac_is_read_from_link_output() {
        let out = "7: cif-12345@if8: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN \\    link/ether 4a:1b:2c:3d:4e:5f brd ff:ff:ff:ff:ff:ff";
        assert_eq!(parse_mac(out).as_deref(), Some("4a:1b:2c:3d:4e:5f"));
        assert_eq!(parse_mac("1: lo: <LOOPBACK>"), None);
    }

    #[test]
    fn attach_to_unknown_network_fails_without_allocating() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = NetworkRegistry::from_config(&RuntimeConfig::with_root(dir.path()));
        let info = ContainerInfo::running(ContainerId::new("1234567890"), 1, "", &["sh".into()]);
        assert!(matches!(
            attach(&registry, "br0", &info),
            Err(MiniboxError::NotFound { kind: "network", .. })
        ));
        assert!(!registry.ipam().path().exists());
    }

    #[test]
    fn release_without_network_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = NetworkRegistry::from_config(&RuntimeConfig::with_root(dir.path()));
        let info = ContainerInfo::running(ContainerId::new("1234567890"), 1, "", &["sh".into()]);
        release(&registry, &info).unwrap();
    }
}
