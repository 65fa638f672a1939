//! Per-session traffic analytics.
//!
//! An [`EventSink`] that keeps what the tunnel reported during a session
//! and summarises it: request totals, tracker share and the noisiest
//! tracker domains. The most recent queries are also kept as a session log.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;

use log::info;
use rustc_hash::FxHashMap;

use crate::enrich::{CompanyInfo, identify_company};
use crate::events::{EventSink, TrafficEvent};

const TOP_THREATS: usize = 5;
/// Session log entries kept; the oldest are evicted first.
pub const MAX_SESSION_LOGS: usize = 1000;

/// One query seen during the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficLog {
    pub timestamp: SystemTime,
    pub domain: String,
    pub is_tracker: bool,
}

/// A tracker domain and how often it was queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatStat {
    pub domain: String,
    pub count: u64,
    pub company: CompanyInfo,
}

#[derive(Default)]
struct Counters {
    total: u64,
    trackers: u64,
    per_tracker: FxHashMap<String, u64>,
    logs: VecDeque<TrafficLog>,
}

#[derive(Default)]
pub struct SessionAnalytics {
    counters: Mutex<Counters>,
}

impl SessionAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_requests(&self) -> u64 {
        self.counters.lock().map(|c| c.total).unwrap_or(0)
    }

    pub fn tracker_count(&self) -> u64 {
        self.counters.lock().map(|c| c.trackers).unwrap_or(0)
    }

    /// The session log, oldest first.
    pub fn logs(&self) -> Vec<TrafficLog> {
        self.counters
            .lock()
            .map(|c| c.logs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Only the tracker queries from the session log, oldest first.
    pub fn blocked_logs(&self) -> Vec<TrafficLog> {
        self.counters
            .lock()
            .map(|c| c.logs.iter().filter(|log| log.is_tracker).cloned().collect())
            .unwrap_or_default()
    }

    /// Share of requests that went to trackers, in whole percent.
    pub fn risk_percentage(&self) -> u64 {
        let Ok(counters) = self.counters.lock() else {
            return 0;
        };
        if counters.total == 0 {
            return 0;
        }
        counters.trackers * 100 / counters.total
    }

    /// The most queried tracker domains, most frequent first.
    pub fn top_threats(&self) -> Vec<ThreatStat> {
        let Ok(counters) = self.counters.lock() else {
            return Vec::new();
        };

        let mut threats: Vec<ThreatStat> = counters
            .per_tracker
            .iter()
            .map(|(domain, &count)| ThreatStat {
                domain: domain.clone(),
                count,
                company: identify_company(domain, true),
            })
            .collect();
        threats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
        threats.truncate(TOP_THREATS);
        threats
    }

    /// Log a one-shot summary of the session.
    pub fn log_summary(&self) {
        info!(
            "[session] requests={} trackers={} risk={}%",
            self.total_requests(),
            self.tracker_count(),
            self.risk_percentage()
        );
        for threat in self.top_threats() {
            info!(
                "[session]   {} x{} ({}, {})",
                threat.domain, threat.count, threat.company.name, threat.company.category
            );
        }
    }
}

impl EventSink for SessionAnalytics {
    fn traffic(&self, event: TrafficEvent) {
        let Ok(mut counters) = self.counters.lock() else {
            return;
        };
        counters.total += 1;
        if event.is_tracker {
            counters.trackers += 1;
            *counters.per_tracker.entry(event.domain.clone()).or_insert(0) += 1;
        }

        if counters.logs.len() == MAX_SESSION_LOGS {
            counters.logs.pop_front();
        }
        counters.logs.push_back(TrafficLog {
            timestamp: SystemTime::now(),
            domain: event.domain,
            is_tracker: event.is_tracker,
        });
    }

    fn status(&self, running: bool) {
        info!("tunnel {}", if running { "running" } else { "stopped" });
    }
}
