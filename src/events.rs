//! Events published to whoever displays the captured traffic.

use tokio::sync::mpsc;

/// One extracted query and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficEvent {
    pub domain: String,
    pub is_tracker: bool,
}

/// Everything the tunnel reports to the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    Traffic(TrafficEvent),
    Status { running: bool },
}

/// Consumer of tunnel events.
///
/// Called from worker tasks; implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    fn traffic(&self, event: TrafficEvent);

    fn status(&self, running: bool);
}

impl EventSink for mpsc::UnboundedSender<TunnelEvent> {
    fn traffic(&self, event: TrafficEvent) {
        // A closed receiver just means nobody is watching anymore.
        let _ = self.send(TunnelEvent::Traffic(event));
    }

    fn status(&self, running: bool) {
        let _ = self.send(TunnelEvent::Status { running });
    }
}
