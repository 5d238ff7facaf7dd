//! IPv4 subnet arithmetic for address assignment
//!
//! Only what address assignment needs: parse a CIDR block, test membership,
//! and hand out the lowest free host address. The network address, the
//! gateway (network + 1) and the broadcast address are never handed out.

use crate::error::{Result, TypesError};
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;

/// An IPv4 CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Parse `a.b.c.d/p` declared on `network_name`. Host bits are masked off.
    pub fn parse(network_name: &str, value: &str) -> Result<Self> {
        let invalid = || TypesError::InvalidSubnet {
            network: network_name.to_string(),
            subnet: value.to_string(),
        };

        let (addr, prefix) = value.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }

        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network).saturating_add(1))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.network)
    }

    /// Whether `addr` may be given to a machine.
    pub fn is_assignable(&self, addr: Ipv4Addr) -> bool {
        self.contains(addr)
            && addr != self.network
            && addr != self.gateway()
            && addr != self.broadcast()
    }

    /// Lowest assignable address not in `used`.
    pub fn first_free(&self, used: &HashSet<Ipv4Addr>) -> Option<Ipv4Addr> {
        let start = u32::from(self.network).checked_add(2)?;
        let end = u32::from(self.broadcast());
        (start..end)
            .map(Ipv4Addr::from)
            .find(|addr| !used.contains(addr))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_mask() {
        let subnet = Subnet::parse("net0", "10.0.0.17/24").unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(subnet.gateway(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(subnet.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["10.0.0.0", "10.0.0.0/33", "10.0.0/24", "subnet/8"] {
            assert!(Subnet::parse("net0", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_first_free_skips_reserved_and_used() {
        let subnet = Subnet::parse("net0", "10.0.0.0/24").unwrap();
        let mut used = HashSet::new();
        assert_eq!(subnet.first_free(&used), Some(Ipv4Addr::new(10, 0, 0, 2)));

        used.insert(Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(subnet.first_free(&used), Some(Ipv4Addr::new(10, 0, 0, 3)));
    }

    #[test]
    fn test_tiny_subnet_has_no_hosts() {
        let subnet = Subnet::parse("p2p", "10.0.0.0/31").unwrap();
        assert_eq!(subnet.first_free(&HashSet::new()), None);
    }

    #[test]
    fn test_assignable() {
        let subnet = Subnet::parse("net0", "192.168.1.0/24").unwrap();
        assert!(subnet.is_assignable(Ipv4Addr::new(192, 168, 1, 10)));
        assert!(!subnet.is_assignable(Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!subnet.is_assignable(Ipv4Addr::new(192, 168, 2, 10)));
    }
}
