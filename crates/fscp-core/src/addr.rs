//! FSCP addresses.
//!
//! An FSCP address wraps a UDP transport address. Resolution only accepts
//! the literal network name `"fscp"`; anything else is an error so that
//! callers cannot silently mix transports.

use crate::error::Error;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

/// The FSCP network name.
pub const NETWORK: &str = "fscp";

/// The default FSCP port.
pub const DEFAULT_PORT: u16 = 5000;

/// An FSCP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr {
    transport_addr: SocketAddr,
}

impl Addr {
    /// The wrapped transport address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        self.transport_addr
    }

    /// The network this address belongs to.
    #[must_use]
    pub fn network(&self) -> &'static str {
        NETWORK
    }
}

impl From<SocketAddr> for Addr {
    fn from(transport_addr: SocketAddr) -> Self {
        Self { transport_addr }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.transport_addr.fmt(f)
    }
}

/// Resolve an FSCP address of the form `host:port`.
///
/// `network` must be the literal `"fscp"`. A missing host (`":5000"`) binds
/// the wildcard IPv4 address, matching the usual listener shorthand.
pub fn resolve_addr(network: &str, address: &str) -> Result<Addr, Error> {
    if network != NETWORK {
        return Err(Error::UnsupportedNetwork(network.to_string()));
    }

    if let Some(port) = address.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| Error::UnresolvableAddress(address.to_string()))?;

        return Ok(Addr::from(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))));
    }

    address
        .to_socket_addrs()
        .map_err(|_| Error::UnresolvableAddress(address.to_string()))?
        .next()
        .map(Addr::from)
        .ok_or_else(|| Error::UnresolvableAddress(address.to_string()))
}
