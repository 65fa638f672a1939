//! The tunnel pump.
//!
//! Owns the virtual interface while running. One reader task pulls packets
//! off the interface and hands each to a worker task; workers run the
//! resolver pipeline and write replies back through a [`PacketWriter`].
//! At most `workers` packets are in flight. A slow upstream only holds up
//! its own worker; once every worker is busy the reader stops reading and
//! the backlog stays in the interface queue.
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!               \______________________________/  (establish failed)
//! ```

use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::TunnelConfig;
use crate::error::TunnelError;
use crate::events::EventSink;
use crate::filter::Blocklist;
use crate::resolver::{QueryAction, Resolver};
use crate::stats::Stats;
use crate::transport::{MAX_DNS_PACKET_SIZE, QueryLogger, Upstream};

use super::device::{Establish, PacketWriter, TunDevice};

/// Lifecycle state of the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// State shared between the pump handle and its reader task.
struct Lifecycle<S> {
    state: Mutex<PumpState>,
    sink: Arc<S>,
}

impl<S: EventSink> Lifecycle<S> {
    fn get(&self) -> PumpState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, next: PumpState) -> PumpState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, next)
    }

    fn running(&self) {
        self.set(PumpState::Running);
        info!("tunnel running");
        self.sink.status(true);
    }

    /// Move to `Stopped`, reporting it only if this is an actual transition.
    fn stopped(&self) {
        if self.set(PumpState::Stopped) != PumpState::Stopped {
            info!("tunnel stopped");
            self.sink.status(false);
        }
    }
}

/// A running session: the reader task and the token that ends it.
struct Session {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

/// Captures DNS queries from a virtual interface and answers them.
pub struct TunnelPump<E, U, S> {
    establisher: E,
    upstream: Arc<U>,
    blocklist: Arc<Blocklist>,
    sink: Arc<S>,
    stats: Arc<Stats>,
    config: TunnelConfig,
    resolver_addr: Mutex<SocketAddrV4>,
    lifecycle: Arc<Lifecycle<S>>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl<E, U, S> TunnelPump<E, U, S>
where
    E: Establish,
    U: Upstream,
    S: EventSink,
{
    pub fn new(
        establisher: E,
        upstream: Arc<U>,
        blocklist: Arc<Blocklist>,
        sink: Arc<S>,
        config: TunnelConfig,
    ) -> Self {
        let lifecycle = Arc::new(Lifecycle {
            state: Mutex::new(PumpState::Stopped),
            sink: sink.clone(),
        });

        Self {
            establisher,
            upstream,
            blocklist,
            sink,
            stats: Arc::new(Stats::new()),
            resolver_addr: Mutex::new(config.upstream),
            config,
            lifecycle,
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> PumpState {
        self.lifecycle.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PumpState::Running
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    pub fn blocklist(&self) -> &Arc<Blocklist> {
        &self.blocklist
    }

    /// The upstream resolver the next session will use.
    pub fn upstream(&self) -> SocketAddrV4 {
        *self.resolver_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the upstream resolver. Takes effect on the next `start()`.
    pub fn set_upstream(&self, addr: SocketAddrV4) {
        *self.resolver_addr.lock().unwrap_or_else(PoisonError::into_inner) = addr;
    }

    /// Bring up the interface and start pumping packets.
    ///
    /// Does nothing if already running. On failure the pump is left stopped.
    pub async fn start(&self) -> Result<(), TunnelError> {
        let mut session = self.session.lock().await;

        let live = session.as_ref().is_some_and(|active| !active.reader.is_finished());
        if live && self.lifecycle.get() != PumpState::Stopped {
            return Ok(());
        }
        // The previous reader ended on its own and already reported it, but
        // may still be tearing down.
        if let Some(stale) = session.take() {
            let _ = stale.reader.await;
        }

        self.lifecycle.set(PumpState::Starting);

        let device = match self.establisher.establish(&self.config.interface) {
            Ok(device) => Arc::new(device),
            Err(e) => {
                warn!("failed to establish tunnel: {}", e);
                self.lifecycle.stopped();
                return Err(TunnelError::Establish(e));
            }
        };

        let resolver_addr = self.upstream();
        let resolver = Arc::new(Resolver::new(
            self.blocklist.clone(),
            self.upstream.clone(),
            self.sink.clone(),
            self.stats.clone(),
            self.config.interface.dns_server,
            resolver_addr,
            self.config.upstream_timeout,
            QueryLogger::new(self.config.verbose),
        ));
        info!(
            "forwarding queries for {} to {} ({} blocked domains)",
            self.config.interface.dns_server,
            resolver_addr,
            self.blocklist.len()
        );

        let cancel = CancellationToken::new();
        let reader = ReadLoop {
            device,
            resolver,
            cancel: cancel.clone(),
            workers: self.config.workers.max(1),
            buffer_len: usize::from(self.config.interface.mtu).max(MAX_DNS_PACKET_SIZE),
            grace: self.config.shutdown_grace(),
            lifecycle: self.lifecycle.clone(),
        };

        self.lifecycle.running();
        *session = Some(Session {
            cancel,
            reader: tokio::spawn(reader.run()),
        });

        Ok(())
    }

    /// Stop pumping and close the interface.
    ///
    /// Returns once the reader and all workers are gone. Does nothing if
    /// already stopped.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        let Some(active) = session.take() else {
            return;
        };

        if self.lifecycle.get() == PumpState::Running {
            self.lifecycle.set(PumpState::Stopping);
        }
        active.cancel.cancel();
        if let Err(e) = active.reader.await {
            warn!("tunnel reader ended abnormally: {}", e);
        }

        self.lifecycle.stopped();
    }
}

impl<E, U, S> Drop for TunnelPump<E, U, S> {
    fn drop(&mut self) {
        if let Some(active) = self.session.get_mut() {
            active.cancel.cancel();
        }
    }
}

/// The reader side of a running session.
struct ReadLoop<D, U, S> {
    device: Arc<D>,
    resolver: Arc<Resolver<U, S>>,
    cancel: CancellationToken,
    workers: usize,
    buffer_len: usize,
    grace: Duration,
    lifecycle: Arc<Lifecycle<S>>,
}

impl<D, U, S> ReadLoop<D, U, S>
where
    D: TunDevice,
    U: Upstream,
    S: EventSink,
{
    async fn run(self) {
        let writer = Arc::new(PacketWriter::new(self.device.clone()));
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut buf = vec![0u8; self.buffer_len];
        let mut failed = false;

        loop {
            while tasks.try_join_next().is_some() {}

            let len = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.device.recv(&mut buf) => match result {
                    Ok(len) => len,
                    Err(e) => {
                        warn!("tunnel read failed: {}", e);
                        failed = true;
                        break;
                    }
                },
            };
            if len == 0 {
                continue;
            }

            // No free worker means no further reads off the interface.
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tasks.spawn(handle_packet(
                buf[..len].to_vec(),
                self.resolver.clone(),
                writer.clone(),
                permit,
                self.cancel.clone(),
            ));
        }

        // Workers see the token and abandon; stragglers are aborted.
        self.cancel.cancel();
        let drained = tokio::time::timeout(self.grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("aborting {} unfinished workers", tasks.len());
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        drop(writer);
        drop(self.device);

        if failed {
            self.lifecycle.stopped();
        }
    }
}

/// Worker: run one packet through the pipeline and write back the reply.
///
/// Holds its pool slot until it returns.
async fn handle_packet<D, U, S>(
    packet: Vec<u8>,
    resolver: Arc<Resolver<U, S>>,
    writer: Arc<PacketWriter<D>>,
    _permit: OwnedSemaphorePermit,
    cancel: CancellationToken,
) where
    D: TunDevice,
    U: Upstream,
    S: EventSink,
{
    let action = tokio::select! {
        _ = cancel.cancelled() => return,
        action = resolver.process_packet(&packet) => action,
    };

    match action {
        QueryAction::Reply { packet: reply, domain } => {
            if cancel.is_cancelled() {
                return;
            }
            if let Err(e) = writer.write(&reply).await {
                warn!("{}: tunnel write failed: {}", domain, e);
            }
        }
        QueryAction::Drop(reason) => debug!("dropped packet: {}", reason),
    }
}
