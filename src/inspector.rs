//! Inspector orchestration.
//!
//! Loads the blocklist, brings up the tunnel and runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;

use crate::analytics::SessionAnalytics;
use crate::config::TunnelConfig;
use crate::filter::{Blocklist, BlocklistSource, FileSource, HttpSource};
use crate::stats::Stats;
use crate::transport::{BindDevice, NoProtect, Protect, UdpUpstream};
use crate::tunnel::{TunRsEstablisher, TunnelPump};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Where the blocklist comes from and how often it is refreshed.
#[derive(Debug, Clone)]
pub struct BlocklistConfig {
    pub url: String,
    /// A local hosts file; takes precedence over `url`.
    pub file: Option<PathBuf>,
    /// Refresh period; `None` loads once at startup.
    pub refresh: Option<Duration>,
}

/// Configuration for the inspector.
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub tunnel: TunnelConfig,
    pub blocklist: BlocklistConfig,
    /// Physical interface upstream sockets are pinned to.
    pub bind_interface: Option<String>,
}

/// Run the inspector until Ctrl-C.
pub async fn run(config: InspectorConfig) -> Result<()> {
    let blocklist = Arc::new(Blocklist::new());
    spawn_refresh(blocklist.clone(), &config.blocklist)?;

    let protect: Arc<dyn Protect> = match &config.bind_interface {
        Some(interface) => {
            info!("pinning upstream sockets to {}", interface);
            Arc::new(BindDevice::new(interface.clone()))
        }
        None => Arc::new(NoProtect),
    };
    let upstream = Arc::new(UdpUpstream::new(protect));
    let analytics = Arc::new(SessionAnalytics::new());

    let pump = TunnelPump::new(
        TunRsEstablisher,
        upstream,
        blocklist.clone(),
        analytics.clone(),
        config.tunnel,
    );
    pump.start().await.context("failed to start tunnel")?;

    let stats_task = tokio::spawn(report_stats(pump.stats(), blocklist));

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    info!("shutting down");

    stats_task.abort();
    pump.stop().await;
    analytics.log_summary();

    Ok(())
}

fn spawn_refresh(blocklist: Arc<Blocklist>, config: &BlocklistConfig) -> Result<()> {
    match &config.file {
        Some(path) => {
            tokio::spawn(refresh_loop(blocklist, FileSource::new(path.clone()), config.refresh));
        }
        None => {
            let source = HttpSource::new(config.url.clone())
                .context("failed to build blocklist HTTP client")?;
            tokio::spawn(refresh_loop(blocklist, source, config.refresh));
        }
    }
    Ok(())
}

async fn refresh_loop<S: BlocklistSource>(
    blocklist: Arc<Blocklist>,
    source: S,
    every: Option<Duration>,
) {
    blocklist.refresh(&source).await;

    let Some(every) = every else {
        return;
    };
    let mut interval = tokio::time::interval(every);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        blocklist.refresh(&source).await;
    }
}

async fn report_stats(stats: Arc<Stats>, blocklist: Arc<Blocklist>) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let snap = stats.snapshot_and_reset();
        info!(
            "[stats] captured={} forwarded={} trackers={} dropped={} timeouts={} avg_upstream={:.2}ms blocklist={}",
            snap.captured,
            snap.forwarded,
            snap.trackers,
            snap.dropped,
            snap.timeouts,
            snap.avg_upstream_ms,
            blocklist.len()
        );
    }
}
