//! Exempting upstream sockets from tunnel routing.
//!
//! Queries forwarded upstream must leave through the real network, not loop
//! back into the virtual interface. How that is done is platform business,
//! so it sits behind [`Protect`].

use std::io;

use socket2::Socket;

/// Exempts a socket from the tunnel's routes before it is used.
pub trait Protect: Send + Sync {
    fn protect(&self, socket: &Socket) -> io::Result<()>;
}

impl<F> Protect for F
where
    F: Fn(&Socket) -> io::Result<()> + Send + Sync,
{
    fn protect(&self, socket: &Socket) -> io::Result<()> {
        self(socket)
    }
}

/// No-op protection.
///
/// Enough when the tunnel only routes the virtual DNS address, so traffic to
/// the upstream resolver never enters it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProtect;

impl Protect for NoProtect {
    fn protect(&self, _socket: &Socket) -> io::Result<()> {
        Ok(())
    }
}

/// Pins sockets to a physical interface (`SO_BINDTODEVICE`).
///
/// Needs `CAP_NET_RAW` on Linux.
#[derive(Debug, Clone)]
pub struct BindDevice {
    interface: String,
}

impl BindDevice {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl Protect for BindDevice {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
    fn protect(&self, socket: &Socket) -> io::Result<()> {
        socket.bind_device(Some(self.interface.as_bytes()))
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
    fn protect(&self, _socket: &Socket) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot bind to interface '{}' on this platform", self.interface),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::{Domain, Protocol, Type};

    fn udp_socket() -> Socket {
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap()
    }

    #[test]
    fn no_protect_accepts_everything() {
        assert!(NoProtect.protect(&udp_socket()).is_ok());
    }

    #[test]
    fn closures_are_protectors() {
        let refuse = |_: &Socket| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "no"))
        };

        let err = refuse.protect(&udp_socket()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn bind_device_to_missing_interface_fails() {
        let protect = BindDevice::new("dnsinspect-no-such-if");

        assert!(protect.protect(&udp_socket()).is_err());
        assert_eq!(protect.interface(), "dnsinspect-no-such-if");
    }
}
