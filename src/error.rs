//! Error types.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure forwarding a query to the upstream resolver.
///
/// Every variant is a dropped query; [`ForwardError::Timeout`] is kept
/// apart so callers can count timeouts separately from network errors.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no reply from upstream within {0:?}")]
    Timeout(Duration),
    #[error("failed to exempt socket from tunnel routing: {0}")]
    Protect(#[source] io::Error),
    #[error("upstream socket error: {0}")]
    Io(#[from] io::Error),
    #[error("upstream sent an empty reply")]
    EmptyReply,
}

impl ForwardError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ForwardError::Timeout(_))
    }
}

/// Failure fetching a blocklist.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("empty blocklist")]
    Empty,
}

/// Failure starting the tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to establish virtual interface: {0}")]
    Establish(#[source] io::Error),
}
