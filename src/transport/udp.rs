//! UDP forwarding to the upstream resolver.
//!
//! Every query gets its own ephemeral socket. Replies are not matched by
//! DNS transaction ID, so a socket must never be shared between two
//! outstanding queries: the connected socket only ever sees its own reply.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::ForwardError;

use super::protect::{NoProtect, Protect};
use super::{MAX_DNS_PACKET_SIZE, Upstream};

/// Forwards queries over one fresh UDP socket per query.
#[derive(Clone)]
pub struct UdpUpstream {
    protect: Arc<dyn Protect>,
}

impl UdpUpstream {
    /// Create a forwarder that protects every socket with `protect`.
    pub fn new(protect: Arc<dyn Protect>) -> Self {
        Self { protect }
    }

    /// Open a protected, non-blocking socket on an ephemeral port.
    fn open_socket(&self) -> Result<UdpSocket, ForwardError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        self.protect
            .protect(&socket)
            .map_err(ForwardError::Protect)?;

        let any = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        socket.bind(&any.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        Ok(UdpSocket::from_std(std_socket)?)
    }
}

impl Default for UdpUpstream {
    fn default() -> Self {
        Self::new(Arc::new(NoProtect))
    }
}

impl Upstream for UdpUpstream {
    async fn forward(
        &self,
        payload: &[u8],
        server: SocketAddrV4,
        timeout: Duration,
    ) -> Result<Vec<u8>, ForwardError> {
        // Dropped, and so closed, on every return path below.
        let socket = self.open_socket()?;

        // Connecting filters out datagrams from anyone but the resolver.
        socket.connect(server).await?;
        socket.send(payload).await?;

        let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
        let len = match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => return Err(ForwardError::Timeout(timeout)),
        };

        if len == 0 {
            return Err(ForwardError::EmptyReply);
        }
        buf.truncate(len);

        Ok(buf)
    }
}
