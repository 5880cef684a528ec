//! Bitmap IP address management.
//!
//! The allocation table maps each subnet (in network-address form, such as
//! `172.18.0.0/24`) to a string of `'0'`/`'1'` with one character per host
//! address. Bit `i` stands for `base + i + 1`; bit 0 is the gateway.
//! The table lives in a single JSON file and is not locked across processes.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnetwork::Ipv4Network;
use minibox_common::error::{MiniboxError, Result};

/// Smallest prefix accepted; larger subnets would need a bitmap of gigabytes.
const MIN_PREFIX: u8 = 8;

type Table = BTreeMap<String, String>;

/// Allocator persisting its bitmaps at a fixed path.
#[derive(Debug, Clone)]
pub struct Ipam {
    path: PathBuf,
}

impl Ipam {
    /// Creates an allocator backed by the table at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the allocation table.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claims the first free address of `subnet`.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::AddressExhausted` if every bit is set, or an
    /// error if the table cannot be read or written.
    pub fn allocate(&self, subnet: &Ipv4Network) -> Result<Ipv4Addr> {
        let (key, base, size) = normalize(subnet)?;
        let mut table = self.load()?;
        let bitmap = table.entry(key.clone()).or_insert_with(|| "0".repeat(size));

        let Some(index) = bitmap.find('0') else {
            return Err(MiniboxError::AddressExhausted { subnet: key });
        };
        bitmap.replace_range(index..=index, "1");

        let offset = u32::try_from(index).map_err(|_| MiniboxError::Config {
            message: format!("bitmap index {index} out of range"),
        })?;
        // Index 0 is the gateway at base + 1, so the last index maps to the
        // first address past the subnet.
        let ip = Ipv4Addr::from(u32::from(base).wrapping_add(offset).wrapping_add(1));
        self.save(&table)?;
        tracing::debug!(subnet = %key, %ip, index, "address allocated");
        Ok(ip)
    }

    /// Returns `ip` to the free pool of `subnet`.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::Config` if `ip` does not map to a bit of the
    /// subnet, or an error if the table cannot be read or written.
    pub fn release(&self, subnet: &Ipv4Network, ip: Ipv4Addr) -> Result<()> {
        let (key, base, size) = normalize(subnet)?;
        let out_of_range = || MiniboxError::Config {
            message: format!("{ip} is not an address of {key}"),
        };
        let index = u32::from(ip)
            .checked_sub(1)
            .and_then(|v| v.checked_sub(u32::from(base)))
            .and_then(|v| usize::try_from(v).ok())
            .filter(|i| *i < size)
            .ok_or_else(out_of_range)?;

        let mut table = self.load()?;
        let bitmap = table.entry(key.clone()).or_insert_with(|| "0".repeat(size));
        bitmap.replace_range(index..=index, "0");
        self.save(&table)?;
        tracing::debug!(subnet = %key, %ip, index, "address released");
        Ok(())
    }

    fn load(&self) -> Result<Table> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Table::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(MiniboxError::io(&self.path, e)),
        }
    }

    fn save(&self, table: &Table) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MiniboxError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(table)?).map_err(|e| MiniboxError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| MiniboxError::io(&self.path, e))
    }
}

/// Table key, base address and bitmap length of `subnet`.
fn normalize(subnet: &Ipv4Network) -> Result<(String, Ipv4Addr, usize)> {
    let prefix = subnet.prefix();
    if prefix < MIN_PREFIX {
        return Err(MiniboxError::Config {
            message: format!("subnet {subnet} is too large; prefix must be at least /{MIN_PREFIX}"),
        });
    }
    let base = subnet.network();
    let key = Ipv4Network::new(base, prefix)
        .map_err(|e| MiniboxError::Config {
            message: format!("invalid subnet {subnet}: {e}"),
        })?
        .to_string();
    Ok((key, base, 1usize << (32 - u32::from(prefix))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(s: &str) -> Ipv4Network {
        s.parse().expect("valid cidr")
    }

    fn ipam_in(dir: &Path) -> Ipam {
        Ipam::new(dir.join("ipam/subnet.json"))
    }

    #[test]
    fn first_allocation_is_the_gateway() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let net = subnet("172.18.0.0/24");
        assert_eq!(ipam.allocate(&net).unwrap(), Ipv4Addr::new(172, 18, 0, 1));
        assert_eq!(ipam.allocate(&net).unwrap(), Ipv4Addr::new(172, 18, 0, 2));
    }

    #[test]
    fn host_bits_of_the_request_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let _ = ipam.allocate(&subnet("172.18.0.0/24")).unwrap();
        let second = ipam.allocate(&subnet("172.18.0.1/24")).unwrap();
        assert_eq!(second, Ipv4Addr::new(172, 18, 0, 2));
    }

    #[test]
    fn table_is_persisted_as_bitmaps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let _ = ipam.allocate(&subnet("10.0.0.0/30")).unwrap();
        let content = std::fs::read_to_string(ipam.path()).unwrap();
        let table: Table = serde_json::from_str(&content).unwrap();
        assert_eq!(table["10.0.0.0/30"], "1000");
    }

    #[test]
    fn full_subnet_is_exhausted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let net = subnet("10.1.0.0/29");
        let gateway = ipam.allocate(&net).unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..7 {
            let ip = ipam.allocate(&net).unwrap();
            assert_ne!(ip, gateway);
            assert!(seen.insert(ip), "duplicate {ip}");
        }
        assert!(matches!(
            ipam.allocate(&net),
            Err(MiniboxError::AddressExhausted { .. })
        ));
    }

    #[test]
    fn last_index_maps_past_the_subnet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let net = subnet("172.18.0.0/24");
        let addresses: Vec<_> = (0..256).map(|_| ipam.allocate(&net).unwrap()).collect();

        assert_eq!(addresses[0], Ipv4Addr::new(172, 18, 0, 1));
        assert_eq!(addresses[254], Ipv4Addr::new(172, 18, 0, 255));
        assert_eq!(addresses[255], Ipv4Addr::new(172, 18, 1, 0));
        assert!(!net.contains(addresses[255]));

        ipam.release(&net, addresses[255]).unwrap();
        assert_eq!(ipam.allocate(&net).unwrap(), Ipv4Addr::new(172, 18, 1, 0));
    }

    #[test]
    fn released_address_is_reused_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let net = subnet("192.168.5.0/24");
        let _gateway = ipam.allocate(&net).unwrap();
        let a = ipam.allocate(&net).unwrap();
        let _b = ipam.allocate(&net).unwrap();

        ipam.release(&net, a).unwrap();
        assert_eq!(ipam.allocate(&net).unwrap(), a);
    }

    #[test]
    fn release_outside_subnet_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let net = subnet("192.168.5.0/24");
        assert!(ipam.release(&net, Ipv4Addr::new(10, 0, 0, 9)).is_err());
        assert!(ipam.release(&net, Ipv4Addr::new(192, 168, 5, 0)).is_err());
    }

    #[test]
    fn subnets_are_tracked_independently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        let _ = ipam.allocate(&subnet("10.2.0.0/24")).unwrap();
        let other = ipam.allocate(&subnet("10.3.0.0/24")).unwrap();
        assert_eq!(other, Ipv4Addr::new(10, 3, 0, 1));
    }

    #[test]
    fn huge_subnet_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipam = ipam_in(dir.path());
        assert!(matches!(
            ipam.allocate(&subnet("10.0.0.0/4")),
            Err(MiniboxError::Config { .. })
        ));
    }
}
