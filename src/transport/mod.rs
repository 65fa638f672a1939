//! Upstream transport.
//!
//! Forwards captured DNS payloads to the real resolver over plain UDP,
//! outside the tunnel.

pub mod protect;
pub mod udp;

pub use protect::{BindDevice, NoProtect, Protect};
pub use udp::UdpUpstream;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

use std::future::Future;
use std::net::SocketAddrV4;
use std::time::Duration;

use log::info;

use crate::error::ForwardError;

/// Something that can answer a DNS query on the tunnel's behalf.
pub trait Upstream: Send + Sync + 'static {
    /// Send `payload` to `server` and wait up to `timeout` for one reply.
    fn forward(
        &self,
        payload: &[u8],
        server: SocketAddrV4,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, ForwardError>> + Send;
}

/// Logger for completed queries.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogger {
    verbose: bool,
}

impl QueryLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn answered(&self, domain: &str, is_tracker: bool, total_ms: f64, upstream_ms: f64) {
        if !self.verbose {
            return;
        }
        let verdict = if is_tracker { "TRACKER" } else { "ok" };
        info!(
            "{} {} total={:.3}ms upstream={:.3}ms",
            domain, verdict, total_ms, upstream_ms
        );
    }

    pub fn dropped(&self, domain: &str, error: &ForwardError) {
        if !self.verbose {
            return;
        }
        info!("{} DROPPED ({})", domain, error);
    }
}
