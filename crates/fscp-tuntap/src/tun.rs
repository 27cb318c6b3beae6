//! The `tun2`-backed adapter implementation.
//!
//! Interface addressing is applied at open time through the device
//! configuration, which is the portable path. Reconfiguring an already-open
//! device is platform-dependent and reported as unsupported here;
//! integrators that need it fall back to an equivalent host route.

use crate::cidr::{Ipv4Cidr, Ipv6Cidr};
use crate::{Adapter, AdapterConfig, AdapterError, AdapterMode, InterfaceInfo};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// A virtual network interface backed by the `tun2` driver.
pub struct TunAdapter {
    device: tun2::AsyncDevice,
    config: AdapterConfig,
    connected: bool,
}

impl TunAdapter {
    /// Open a virtual interface described by `config`.
    ///
    /// The interface comes up immediately; addresses from the configuration
    /// are applied while it is created.
    pub async fn open(config: AdapterConfig) -> Result<Self, AdapterError> {
        let mut device_config = tun2::Configuration::default();

        if !config.name.is_empty() {
            device_config.tun_name(&config.name);
        }

        if config.mode == AdapterMode::Tap {
            device_config.layer(tun2::Layer::L2);
        }

        if let Some(ipv4) = config.ipv4 {
            device_config.address(ipv4.address).netmask(ipv4.netmask());
        }

        if let Some(remote) = config.remote_ipv4 {
            if config.mode == AdapterMode::Tap {
                return Err(AdapterError::Config(
                    "a remote IPv4 address only applies to TUN adapters".to_string(),
                ));
            }

            device_config.destination(remote);
        }

        if config.ipv6.is_some() {
            // The driver only takes IPv4 addressing; IPv6 is applied by the
            // host network tools or an equivalent route.
            debug!("leaving IPv6 address configuration to the host");
        }

        device_config.mtu(config.mtu).up();

        let device = tun2::create_as_async(&device_config)
            .map_err(|e| AdapterError::Config(e.to_string()))?;

        debug!(name = %config.name, mode = ?config.mode, "opened virtual interface");

        Ok(Self {
            device,
            config,
            connected: true,
        })
    }
}

#[async_trait]
impl Adapter for TunAdapter {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, AdapterError> {
        Ok(self.device.read(buf).await?)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, AdapterError> {
        Ok(self.device.write(buf).await?)
    }

    fn interface(&self) -> InterfaceInfo {
        let mut addresses: Vec<IpAddr> = Vec::new();

        if let Some(ipv4) = self.config.ipv4 {
            addresses.push(IpAddr::V4(ipv4.address));
        }

        if let Some(ipv6) = self.config.ipv6 {
            addresses.push(IpAddr::V6(ipv6.address));
        }

        InterfaceInfo {
            name: self.config.name.clone(),
            mtu: self.config.mtu,
            hardware_addr: None,
            addresses,
        }
    }

    fn set_connected_state(&mut self, connected: bool) -> Result<(), AdapterError> {
        if connected == self.connected {
            return Ok(());
        }

        if !connected {
            return Err(AdapterError::Unsupported(
                "bringing the link down requires reopening the adapter",
            ));
        }

        self.connected = connected;

        Ok(())
    }

    fn set_ipv4(&mut self, _cidr: Ipv4Cidr) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported(
            "IPv4 reconfiguration after open; set it in the adapter configuration",
        ))
    }

    fn set_ipv6(&mut self, _cidr: Ipv6Cidr) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported(
            "IPv6 reconfiguration after open; set it in the adapter configuration",
        ))
    }

    fn set_remote_ipv4(&mut self, _addr: Ipv4Addr) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported(
            "remote IPv4 reconfiguration after open; set it in the adapter configuration",
        ))
    }

    async fn close(&mut self) -> Result<(), AdapterError> {
        self.connected = false;
        self.device.shutdown().await?;

        Ok(())
    }
}
