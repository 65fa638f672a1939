use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use dnsinspect::config::{self, InterfaceConfig, TunnelConfig, parse_upstream};
use dnsinspect::filter::DEFAULT_BLOCKLIST_URL;
use dnsinspect::inspector::{self, BlocklistConfig, InspectorConfig};

#[derive(Parser)]
#[command(name = "dnsinspect")]
#[command(about = "On-device DNS inspection tunnel", long_about = None)]
struct Args {
    /// TUN device name
    #[arg(long, default_value = "dnsinspect0")]
    name: String,

    /// Local address of the tunnel
    #[arg(long, default_value_t = config::DEFAULT_ADDRESS)]
    address: Ipv4Addr,

    /// Virtual DNS server address (the only address routed into the tunnel)
    #[arg(long, default_value_t = config::VIRTUAL_DNS)]
    dns: Ipv4Addr,

    /// Interface MTU
    #[arg(long, default_value_t = config::DEFAULT_MTU)]
    mtu: u16,

    /// Upstream DNS server (ip or ip:port)
    #[arg(short, long, env = "DNSINSPECT_UPSTREAM", default_value = "1.1.1.1", value_parser = parse_upstream)]
    upstream: SocketAddrV4,

    /// How long to wait for an upstream reply, in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Number of queries processed concurrently
    #[arg(long, default_value_t = config::DEFAULT_WORKERS)]
    workers: usize,

    /// Hosts-format blocklist URL
    #[arg(long, default_value = DEFAULT_BLOCKLIST_URL)]
    blocklist_url: String,

    /// Local hosts-format blocklist (overrides --blocklist-url)
    #[arg(long)]
    blocklist_file: Option<PathBuf>,

    /// Blocklist refresh interval in seconds (0 = load once)
    #[arg(long, default_value_t = 0)]
    refresh_secs: u64,

    /// Pin upstream sockets to this interface so they bypass the tunnel
    #[arg(long)]
    bind_interface: Option<String>,

    /// Log every answered query
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> InspectorConfig {
        InspectorConfig {
            tunnel: TunnelConfig {
                interface: InterfaceConfig {
                    name: self.name,
                    address: self.address,
                    dns_server: self.dns,
                    mtu: self.mtu,
                },
                upstream: self.upstream,
                upstream_timeout: Duration::from_millis(self.timeout_ms),
                workers: self.workers,
                verbose: self.verbose,
            },
            blocklist: BlocklistConfig {
                url: self.blocklist_url,
                file: self.blocklist_file,
                refresh: (self.refresh_secs > 0).then_some(Duration::from_secs(self.refresh_secs)),
            },
            bind_interface: self.bind_interface,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(inspector::run(args.into_config()))
}
