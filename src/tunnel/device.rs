//! Virtual interface abstraction.
//!
//! The pump only needs a packet-at-a-time duplex handle. [`Establish`]
//! produces one from an [`InterfaceConfig`]; the real implementation is
//! backed by a `tun-rs` device.

use std::future::Future;
use std::io;
use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;

use crate::config::InterfaceConfig;

/// A duplex handle carrying whole IPv4 datagrams.
pub trait TunDevice: Send + Sync + 'static {
    /// Read one packet into `buf`, returning its length.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Write one complete packet.
    fn send(&self, packet: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Brings up a virtual interface.
pub trait Establish: Send + Sync + 'static {
    type Device: TunDevice;

    fn establish(&self, config: &InterfaceConfig) -> io::Result<Self::Device>;
}

impl TunDevice for tun_rs::AsyncDevice {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        tun_rs::AsyncDevice::recv(self, buf).await
    }

    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        tun_rs::AsyncDevice::send(self, packet).await
    }
}

/// Creates an OS TUN device.
///
/// The interface gets `address/32` with `dns_server` as its point-to-point
/// peer, so the only route through it is the virtual DNS server. Requires
/// `CAP_NET_ADMIN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TunRsEstablisher;

impl Establish for TunRsEstablisher {
    type Device = tun_rs::AsyncDevice;

    fn establish(&self, config: &InterfaceConfig) -> io::Result<Self::Device> {
        let device = tun_rs::DeviceBuilder::new()
            .name(&config.name)
            .ipv4(config.address, 32, Some(config.dns_server))
            .mtu(config.mtu)
            .build_async()?;

        info!(
            "interface {} up: {}/32 -> {} mtu {}",
            config.name, config.address, config.dns_server, config.mtu
        );
        info!("use {} as the system DNS server to route queries through it", config.dns_server);

        Ok(device)
    }
}

/// Serialises writes to a shared device: one packet at a time.
pub struct PacketWriter<D> {
    device: Mutex<Arc<D>>,
}

impl<D: TunDevice> PacketWriter<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    /// Write one packet; a partial write is an error.
    pub async fn write(&self, packet: &[u8]) -> io::Result<()> {
        let device = self.device.lock().await;
        let written = device.send(packet).await?;
        if written != packet.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short tunnel write: {written} of {} bytes", packet.len()),
            ));
        }
        Ok(())
    }
}
