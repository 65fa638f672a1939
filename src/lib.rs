//! dnsinspect - on-device DNS inspection tunnel.
//!
//! Captures DNS queries from a virtual interface, classifies each queried
//! domain against a tracker blocklist, forwards the query to a real
//! resolver and writes a forged reply back into the interface.

pub mod analytics;
pub mod config;
pub mod enrich;
pub mod error;
pub mod events;
pub mod filter;
pub mod inspector;
pub mod packet;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod tunnel;
