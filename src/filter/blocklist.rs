//! Blocklist of ad/tracking domains.
//!
//! Holds the current set of blocked domains behind an atomically swapped
//! snapshot: lookups never take a lock and never see a half-applied refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use log::{info, warn};
use rustc_hash::FxHashSet;

use super::source::{BlocklistSource, parse_hosts};

/// Well-known trackers used until a real list has been loaded.
pub const FALLBACK_DOMAINS: &[&str] = &["google-analytics.com", "doubleclick.net", "facebook.com"];

/// An immutable set of blocked domains.
pub type Snapshot = FxHashSet<String>;

/// A replaceable set of blocked domains for efficient lookup.
pub struct Blocklist {
    snapshot: ArcSwap<Snapshot>,
    loaded: AtomicBool,
}

impl Blocklist {
    /// Create a blocklist seeded with [`FALLBACK_DOMAINS`].
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(fallback()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Create a blocklist from an explicit set of domains.
    ///
    /// Counts as loaded: a later failed refresh keeps these domains.
    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().to_ascii_lowercase())
            .collect();

        Self {
            snapshot: ArcSwap::from_pointee(domains),
            loaded: AtomicBool::new(true),
        }
    }

    /// Check if a domain is blocked (exact, case-insensitive match).
    pub fn is_blocked(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        let snapshot = self.snapshot.load();
        if snapshot.contains(domain) {
            return true;
        }
        domain.bytes().any(|b| b.is_ascii_uppercase())
            && snapshot.contains(&domain.to_ascii_lowercase())
    }

    /// Returns the number of domains in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a list other than the fallback has ever been installed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Replace the whole snapshot.
    pub fn replace(&self, domains: Snapshot) {
        self.snapshot.store(Arc::new(domains));
        self.loaded.store(true, Ordering::Release);
    }

    /// Fetch a hosts-format list from `source` and install it.
    ///
    /// On fetch failure, or when the list has no usable entries, the current
    /// snapshot stays in place; if nothing was ever loaded the fallback set is
    /// (re)installed. Never fails.
    pub async fn refresh<S: BlocklistSource>(&self, source: &S) -> bool {
        let domains = match source.fetch().await {
            Ok(text) => parse_hosts(&text),
            Err(e) => {
                warn!("blocklist fetch from {} failed: {}", source.describe(), e);
                self.keep_or_fallback();
                return false;
            }
        };

        if domains.is_empty() {
            warn!("blocklist from {} has no usable entries", source.describe());
            self.keep_or_fallback();
            return false;
        }

        info!("loaded {} blocked domains from {}", domains.len(), source.describe());
        self.replace(domains);
        true
    }

    fn keep_or_fallback(&self) {
        if !self.is_loaded() {
            self.snapshot.store(Arc::new(fallback()));
        }
    }
}

impl Default for Blocklist {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback() -> Snapshot {
    FALLBACK_DOMAINS.iter().map(|d| d.to_string()).collect()
}
