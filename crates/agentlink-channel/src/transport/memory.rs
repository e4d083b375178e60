//! In-process transport
//!
//! Connects an endpoint to a UI surface living in the same process (and to
//! test harnesses). The [`MemoryPeer`] half accepts connections and can
//! refuse or fail upcoming connects to simulate an unavailable peer.

use super::{Connector, Link};
use agentlink_core::{Envelope, EnvelopeType, Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct Control {
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    refusing: AtomicBool,
}

/// Agent side of an in-process transport.
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<PeerConnection>,
    control: Arc<Control>,
}

/// UI side of an in-process transport: accepts connections.
pub struct MemoryPeer {
    accept_rx: mpsc::UnboundedReceiver<PeerConnection>,
    control: Arc<Control>,
}

impl MemoryConnector {
    pub fn pair() -> (MemoryConnector, MemoryPeer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let control = Arc::new(Control::default());
        (
            MemoryConnector {
                accept_tx,
                control: control.clone(),
            },
            MemoryPeer { accept_rx, control },
        )
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn connect(&self, name: &str) -> Result<Link> {
        self.control.attempts.fetch_add(1, Ordering::SeqCst);

        if self.control.refusing.load(Ordering::SeqCst) {
            return Err(Error::connect_failed(name, "peer refusing connections"));
        }
        let failed = self
            .control
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::connect_failed(name, "simulated connect failure"));
        }

        let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
        let (from_peer_tx, from_peer_rx) = mpsc::unbounded_channel();
        let conn = PeerConnection {
            name: name.to_string(),
            inbound: to_peer_rx,
            outbound: from_peer_tx,
        };
        self.accept_tx
            .send(conn)
            .map_err(|_| Error::connect_failed(name, "peer is gone"))?;

        debug!("memory link opened: {}", name);
        Ok(Link {
            outbound: to_peer_tx,
            inbound: from_peer_rx,
        })
    }
}

impl MemoryPeer {
    /// Wait for the next incoming connection.
    pub async fn accept(&mut self) -> Option<PeerConnection> {
        self.accept_rx.recv().await
    }

    pub fn try_accept(&mut self) -> Option<PeerConnection> {
        self.accept_rx.try_recv().ok()
    }

    /// Total connect attempts seen, successful or not.
    pub fn connect_attempts(&self) -> usize {
        self.control.attempts.load(Ordering::SeqCst)
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.control.fail_next.store(n, Ordering::SeqCst);
    }

    /// Refuse every connect attempt until cleared.
    pub fn set_refusing(&self, refusing: bool) {
        self.control.refusing.store(refusing, Ordering::SeqCst);
    }
}

/// The UI surface's end of one accepted link. Dropping it drops the link.
pub struct PeerConnection {
    name: String,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl PeerConnection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next envelope from the agent, heartbeats included. `None` once the
    /// agent side has dropped the link.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.inbound.try_recv().ok()
    }

    /// Next application envelope. Heartbeats are acknowledged on the way.
    pub async fn next_message(&mut self) -> Option<Envelope> {
        loop {
            let envelope = self.inbound.recv().await?;
            match envelope.kind {
                EnvelopeType::Heartbeat => {
                    let ts = envelope.heartbeat_timestamp().unwrap_or_default();
                    self.send(Envelope::heartbeat_ack(ts));
                }
                EnvelopeType::HeartbeatAck => {}
                _ => return Some(envelope),
            }
        }
    }

    /// Send to the agent. Returns `false` if the agent side is gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.outbound.send(envelope).is_ok()
    }

    /// Drop the link from the UI side.
    pub fn close(self) {}
}
