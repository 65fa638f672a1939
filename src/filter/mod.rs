//! Tracker classification.
//!
//! Classifies queried domains against a blocklist of known ad/tracking
//! domains loaded from a hosts-format source.

mod blocklist;
pub mod source;

pub use blocklist::{Blocklist, FALLBACK_DOMAINS, Snapshot};
pub use source::{BlocklistSource, DEFAULT_BLOCKLIST_URL, FileSource, HttpSource, parse_hosts};
