//! # FSCP TUN/TAP
//!
//! Virtual network interface adapters for FSCP integrators.
//!
//! An adapter is an opaque read/write/close handle over a platform virtual
//! interface: raw IP packets for TUN, raw Ethernet frames for TAP. The
//! protocol engine never touches adapters itself; integrators bridge a
//! connection and an adapter with two tasks, one per direction:
//!
//! ```text
//! adapter.read ──▶ connection.write        connection.read ──▶ adapter.write
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cidr;
pub mod tun;

pub use cidr::{Ipv4Cidr, Ipv6Cidr};
pub use tun::TunAdapter;

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The operation is not supported on this platform or adapter mode.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The adapter configuration is invalid.
    #[error("invalid adapter configuration: {0}")]
    Config(String),

    /// An I/O error on the underlying device.
    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The layer an adapter operates at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterMode {
    /// Layer 3: the adapter carries raw IP packets.
    Tun,
    /// Layer 2: the adapter carries raw Ethernet frames.
    Tap,
}

/// Configuration for opening an adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// The OS-specific interface name. Empty triggers auto-assignment.
    pub name: String,
    /// The adapter layer.
    pub mode: AdapterMode,
    /// An IPv4 address to set on the interface once it is up.
    pub ipv4: Option<Ipv4Cidr>,
    /// The remote IPv4 address of a point-to-point TUN link.
    pub remote_ipv4: Option<Ipv4Addr>,
    /// An IPv6 address to set on the interface once it is up.
    pub ipv6: Option<Ipv6Cidr>,
    /// The interface MTU.
    pub mtu: u16,
}

impl AdapterConfig {
    /// A TUN configuration with auto-assigned name and default MTU.
    #[must_use]
    pub fn tun() -> Self {
        Self {
            name: String::new(),
            mode: AdapterMode::Tun,
            ipv4: None,
            remote_ipv4: None,
            ipv6: None,
            mtu: DEFAULT_MTU,
        }
    }

    /// A TAP configuration with auto-assigned name and default MTU.
    #[must_use]
    pub fn tap() -> Self {
        Self {
            mode: AdapterMode::Tap,
            ..Self::tun()
        }
    }
}

/// The default interface MTU.
pub const DEFAULT_MTU: u16 = 1500;

/// A snapshot of an adapter's interface properties.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// The interface name.
    pub name: String,
    /// The interface MTU.
    pub mtu: u16,
    /// The hardware address, for TAP interfaces that have one.
    pub hardware_addr: Option<[u8; 6]>,
    /// The addresses configured on the interface.
    pub addresses: Vec<IpAddr>,
}

/// An open virtual network interface.
///
/// Frames are raw Ethernet for TAP adapters and raw IP for TUN adapters.
/// The `set_*` operations are best-effort: platforms or modes that cannot
/// honor them report [`AdapterError::Unsupported`].
#[async_trait]
pub trait Adapter: Send {
    /// Read one frame from the interface.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, AdapterError>;

    /// Write one frame to the interface.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, AdapterError>;

    /// The interface properties.
    fn interface(&self) -> InterfaceInfo;

    /// Bring the link up or down.
    fn set_connected_state(&mut self, connected: bool) -> Result<(), AdapterError>;

    /// Set the interface IPv4 address.
    fn set_ipv4(&mut self, cidr: Ipv4Cidr) -> Result<(), AdapterError>;

    /// Set the interface IPv6 address.
    fn set_ipv6(&mut self, cidr: Ipv6Cidr) -> Result<(), AdapterError>;

    /// Set the remote IPv4 address of a point-to-point TUN link.
    fn set_remote_ipv4(&mut self, addr: Ipv4Addr) -> Result<(), AdapterError>;

    /// Close the adapter. The handle is unusable afterwards.
    async fn close(&mut self) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let tun = AdapterConfig::tun();
        assert_eq!(tun.mode, AdapterMode::Tun);
        assert!(tun.name.is_empty());
        assert_eq!(tun.mtu, DEFAULT_MTU);

        let tap = AdapterConfig::tap();
        assert_eq!(tap.mode, AdapterMode::Tap);
        assert_eq!(tap.mtu, DEFAULT_MTU);
    }
}
