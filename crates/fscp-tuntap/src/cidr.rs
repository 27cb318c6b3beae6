//! CIDR address notation for adapter configuration.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 address with a prefix length, in `a.b.c.d/n` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    /// The interface address.
    pub address: Ipv4Addr,
    /// The network prefix length, at most 32.
    pub prefix_len: u8,
}

impl Ipv4Cidr {
    /// Build a CIDR, rejecting prefix lengths above 32.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, InvalidCidr> {
        if prefix_len > 32 {
            return Err(InvalidCidr);
        }

        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// The netmask matching the prefix length.
    #[must_use]
    pub fn netmask(&self) -> Ipv4Addr {
        let bits = if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        };

        Ipv4Addr::from(bits)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = InvalidCidr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix_len) = s.split_once('/').ok_or(InvalidCidr)?;

        Self::new(
            address.parse().map_err(|_| InvalidCidr)?,
            prefix_len.parse().map_err(|_| InvalidCidr)?,
        )
    }
}

/// An IPv6 address with a prefix length, in `addr/n` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Cidr {
    /// The interface address.
    pub address: Ipv6Addr,
    /// The network prefix length, at most 128.
    pub prefix_len: u8,
}

impl Ipv6Cidr {
    /// Build a CIDR, rejecting prefix lengths above 128.
    pub fn new(address: Ipv6Addr, prefix_len: u8) -> Result<Self, InvalidCidr> {
        if prefix_len > 128 {
            return Err(InvalidCidr);
        }

        Ok(Self {
            address,
            prefix_len,
        })
    }
}

impl fmt::Display for Ipv6Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv6Cidr {
    type Err = InvalidCidr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix_len) = s.split_once('/').ok_or(InvalidCidr)?;

        Self::new(
            address.parse().map_err(|_| InvalidCidr)?,
            prefix_len.parse().map_err(|_| InvalidCidr)?,
        )
    }
}

/// A CIDR string could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCidr;

impl fmt::Display for InvalidCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid CIDR notation")
    }
}

impl std::error::Error for InvalidCidr {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_parse_and_display() {
        let cidr: Ipv4Cidr = "10.0.0.1/24".parse().unwrap();

        assert_eq!(cidr.address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(cidr.prefix_len, 24);
        assert_eq!(cidr.to_string(), "10.0.0.1/24");
    }

    #[test]
    fn test_ipv4_netmask() {
        let cidr: Ipv4Cidr = "10.0.0.1/24".parse().unwrap();
        assert_eq!(cidr.netmask(), Ipv4Addr::new(255, 255, 255, 0));

        let cidr: Ipv4Cidr = "10.0.0.1/0".parse().unwrap();
        assert_eq!(cidr.netmask(), Ipv4Addr::new(0, 0, 0, 0));

        let cidr: Ipv4Cidr = "10.0.0.1/32".parse().unwrap();
        assert_eq!(cidr.netmask(), Ipv4Addr::new(255, 255, 255, 255));

        let cidr: Ipv4Cidr = "172.16.0.5/12".parse().unwrap();
        assert_eq!(cidr.netmask(), Ipv4Addr::new(255, 240, 0, 0));
    }

    #[test]
    fn test_ipv4_rejects_bad_input() {
        assert!("10.0.0.1".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.1/33".parse::<Ipv4Cidr>().is_err());
        assert!("not-an-ip/8".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.1/x".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_ipv6_parse_and_display() {
        let cidr: Ipv6Cidr = "fd00::1/64".parse().unwrap();

        assert_eq!(cidr.prefix_len, 64);
        assert_eq!(cidr.to_string(), "fd00::1/64");

        assert!("fd00::1/129".parse::<Ipv6Cidr>().is_err());
    }
}
