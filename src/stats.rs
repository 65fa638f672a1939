//! Statistics tracking for the tunnel.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for tunnel activity.
pub struct Stats {
    pub captured: AtomicU64,
    pub forwarded: AtomicU64,
    pub trackers: AtomicU64,
    pub dropped: AtomicU64,
    pub timeouts: AtomicU64,
    /// Cumulative upstream time in microseconds for averaging.
    total_upstream_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            captured: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            trackers: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            total_upstream_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tracker(&self) {
        self.trackers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self, upstream_ms: f64) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.total_upstream_time_us
            .fetch_add((upstream_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let captured = self.captured.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let trackers = self.trackers.swap(0, Ordering::Relaxed);
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        let timeouts = self.timeouts.swap(0, Ordering::Relaxed);
        let total_us = self.total_upstream_time_us.swap(0, Ordering::Relaxed);

        let avg_upstream_ms = if forwarded > 0 {
            (total_us as f64 / forwarded as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            captured,
            forwarded,
            trackers,
            dropped,
            timeouts,
            avg_upstream_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub captured: u64,
    pub forwarded: u64,
    pub trackers: u64,
    pub dropped: u64,
    pub timeouts: u64,
    pub avg_upstream_ms: f64,
}
