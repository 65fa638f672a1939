//! Per-packet query pipeline.
//!
//! Handles one captured packet end to end:
//! 1. Extract the DNS query (drop anything else)
//! 2. Classify the domain against the blocklist and report it
//! 3. Forward the payload to the upstream resolver
//! 4. Forge the reply packet for the tunnel
//!
//! The tunnel pump handles the I/O, the resolver handles decisions.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::ForwardError;
use crate::events::{EventSink, TrafficEvent};
use crate::filter::Blocklist;
use crate::packet::{DnsQuery, build_reply};
use crate::stats::Stats;
use crate::transport::{QueryLogger, Upstream};

/// What to do with a captured packet.
#[derive(Debug)]
pub enum QueryAction {
    /// Write this packet back to the tunnel.
    Reply { packet: Vec<u8>, domain: String },
    /// Write nothing.
    Drop(DropReason),
}

/// Why a packet produced no reply.
#[derive(Debug)]
pub enum DropReason {
    /// Not a DNS query (or malformed).
    NotDns,
    /// A DNS query for some other server.
    WrongServer(Ipv4Addr),
    /// Upstream did not answer.
    Upstream(ForwardError),
    /// The reply could not be wrapped in a datagram.
    Unforgeable,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NotDns => write!(f, "not a DNS query"),
            DropReason::WrongServer(addr) => write!(f, "query for {addr}, not the virtual server"),
            DropReason::Upstream(e) => write!(f, "{e}"),
            DropReason::Unforgeable => write!(f, "reply too large to forge"),
        }
    }
}

/// Resolver handles the query pipeline for one tunnel session.
///
/// The upstream address is fixed for the session's lifetime.
pub struct Resolver<U, S> {
    blocklist: Arc<Blocklist>,
    upstream: Arc<U>,
    sink: Arc<S>,
    stats: Arc<Stats>,
    server: Ipv4Addr,
    resolver_addr: SocketAddrV4,
    timeout: Duration,
    logger: QueryLogger,
}

impl<U: Upstream, S: EventSink> Resolver<U, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blocklist: Arc<Blocklist>,
        upstream: Arc<U>,
        sink: Arc<S>,
        stats: Arc<Stats>,
        server: Ipv4Addr,
        resolver_addr: SocketAddrV4,
        timeout: Duration,
        logger: QueryLogger,
    ) -> Self {
        Self {
            blocklist,
            upstream,
            sink,
            stats,
            server,
            resolver_addr,
            timeout,
            logger,
        }
    }

    /// Run the full pipeline for one captured packet.
    pub async fn process_packet(&self, packet: &[u8]) -> QueryAction {
        let start_time = Instant::now();
        self.stats.record_captured();

        let Some(query) = DnsQuery::extract(packet) else {
            self.stats.record_dropped();
            return QueryAction::Drop(DropReason::NotDns);
        };
        if query.destination != self.server {
            self.stats.record_dropped();
            return QueryAction::Drop(DropReason::WrongServer(query.destination));
        }

        let is_tracker = self.blocklist.is_blocked(&query.domain);
        if is_tracker {
            self.stats.record_tracker();
        }
        self.sink.traffic(TrafficEvent {
            domain: query.domain.clone(),
            is_tracker,
        });

        let upstream_start = Instant::now();
        let reply = match self
            .upstream
            .forward(query.payload(), self.resolver_addr, self.timeout)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_timeout() {
                    self.stats.record_timeout();
                } else {
                    self.stats.record_dropped();
                }
                self.logger.dropped(&query.domain, &e);
                return QueryAction::Drop(DropReason::Upstream(e));
            }
        };
        let upstream_ms = upstream_start.elapsed().as_secs_f64() * 1000.0;

        let Some(reply_packet) = build_reply(self.server, packet, &reply) else {
            debug!("{}: reply of {} bytes cannot be forged", query.domain, reply.len());
            self.stats.record_dropped();
            return QueryAction::Drop(DropReason::Unforgeable);
        };

        self.stats.record_forwarded(upstream_ms);
        self.logger.answered(
            &query.domain,
            is_tracker,
            start_time.elapsed().as_secs_f64() * 1000.0,
            upstream_ms,
        );

        QueryAction::Reply {
            packet: reply_packet,
            domain: query.domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::config::VIRTUAL_DNS;
    use crate::events::TunnelEvent;
    use crate::packet::testing::{captured_query, dns_query, udp_packet};

    /// Answers with a fixed reply, or times out when there is none.
    struct FakeUpstream {
        reply: Option<Vec<u8>>,
        seen: Mutex<Vec<(Vec<u8>, SocketAddrV4)>>,
    }

    impl FakeUpstream {
        fn answering(reply: &[u8]) -> Self {
            Self {
                reply: Some(reply.to_vec()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn silent() -> Self {
            Self {
                reply: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Upstream for FakeUpstream {
        async fn forward(
            &self,
            payload: &[u8],
            server: SocketAddrV4,
            timeout: Duration,
        ) -> Result<Vec<u8>, ForwardError> {
            self.seen.lock().unwrap().push((payload.to_vec(), server));
            self.reply.clone().ok_or(ForwardError::Timeout(timeout))
        }
    }

    fn upstream_addr() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(9, 9, 9, 9), 53)
    }

    fn resolver(
        upstream: FakeUpstream,
    ) -> (
        Resolver<FakeUpstream, mpsc::UnboundedSender<TunnelEvent>>,
        Arc<FakeUpstream>,
        Arc<Stats>,
        mpsc::UnboundedReceiver<TunnelEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let upstream = Arc::new(upstream);
        let stats = Arc::new(Stats::new());
        let resolver = Resolver::new(
            Arc::new(Blocklist::from_domains(["ads.example.com"])),
            upstream.clone(),
            Arc::new(tx),
            stats.clone(),
            VIRTUAL_DNS,
            upstream_addr(),
            Duration::from_millis(2000),
            QueryLogger::new(false),
        );
        (resolver, upstream, stats, rx)
    }

    #[tokio::test]
    async fn tracker_query_is_reported_forwarded_and_answered() {
        let reply = b"\xbe\xef\x81\x80resolver-reply-bytes";
        let (resolver, upstream, stats, mut events) = resolver(FakeUpstream::answering(reply));
        let packet = captured_query(0xbeef, "ads.example.com");

        let QueryAction::Reply { packet: out, domain } = resolver.process_packet(&packet).await
        else {
            panic!("expected a reply");
        };

        assert_eq!(domain, "ads.example.com");
        assert_eq!(u16::from_be_bytes([out[2], out[3]]) as usize, 28 + reply.len());
        assert_eq!(&out[12..16], &[10, 0, 0, 5]);
        assert_eq!(&out[16..20], &[10, 0, 0, 2]);
        assert_eq!(u16::from_be_bytes([out[22], out[23]]), 40000);
        assert_eq!(&out[out.len() - reply.len()..], &reply[..]);

        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, &packet[28..]);
        assert_eq!(seen[0].1, upstream_addr());

        assert_eq!(
            events.try_recv().unwrap(),
            TunnelEvent::Traffic(TrafficEvent {
                domain: "ads.example.com".into(),
                is_tracker: true,
            })
        );

        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.trackers, 1);
        assert_eq!(snap.forwarded, 1);
    }

    #[tokio::test]
    async fn clean_domains_are_not_trackers() {
        let (resolver, _, _, mut events) = resolver(FakeUpstream::answering(b"reply"));

        resolver
            .process_packet(&captured_query(1, "example.org"))
            .await;

        assert_eq!(
            events.try_recv().unwrap(),
            TunnelEvent::Traffic(TrafficEvent {
                domain: "example.org".into(),
                is_tracker: false,
            })
        );
    }

    #[tokio::test]
    async fn non_dns_packets_are_dropped_without_forwarding() {
        let (resolver, upstream, _, mut events) = resolver(FakeUpstream::answering(b"reply"));
        let packet = udp_packet(
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            VIRTUAL_DNS,
            123,
            &dns_query(1, "example.com"),
        );

        let action = resolver.process_packet(&packet).await;

        assert!(matches!(action, QueryAction::Drop(DropReason::NotDns)));
        assert!(upstream.seen.lock().unwrap().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn queries_for_other_servers_are_dropped() {
        let (resolver, upstream, _, _) = resolver(FakeUpstream::answering(b"reply"));
        let packet = udp_packet(
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            Ipv4Addr::new(8, 8, 8, 8),
            53,
            &dns_query(1, "example.com"),
        );

        let action = resolver.process_packet(&packet).await;

        assert!(matches!(action, QueryAction::Drop(DropReason::WrongServer(_))));
        assert!(upstream.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_timeout_drops_the_query() {
        let (resolver, _, stats, mut events) = resolver(FakeUpstream::silent());

        let action = resolver
            .process_packet(&captured_query(1, "ads.example.com"))
            .await;

        let QueryAction::Drop(DropReason::Upstream(e)) = action else {
            panic!("expected an upstream drop");
        };
        assert!(e.is_timeout());
        // The query itself was still observed.
        assert!(matches!(events.try_recv(), Ok(TunnelEvent::Traffic(_))));

        let snap = stats.snapshot_and_reset();
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.forwarded, 0);
    }
}
