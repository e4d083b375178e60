//! Transports a channel endpoint can run over
//!
//! A transport only has to produce a [`Link`]: a pair of unbounded queues of
//! envelopes. The inbound side closing is the link-drop notification; a
//! failed send on the outbound side is a transmit failure.

pub mod memory;
pub mod ws;

use agentlink_core::{Envelope, Result};
use tokio::sync::mpsc;

/// One live connection to a peer.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
}

/// Opens links to a named peer.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Short transport name for logs (e.g. "memory", "ws").
    fn kind(&self) -> &str;

    async fn connect(&self, name: &str) -> Result<Link>;
}
