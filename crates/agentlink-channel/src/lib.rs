//! Agentlink Channel - Self-healing message channels to UI surfaces

pub mod config;
pub mod endpoint;
pub mod registry;
pub mod transport;

pub use config::ChannelConfig;
pub use endpoint::{ChannelEndpoint, ListenerId, SendOutcome};
pub use registry::{ChannelInfo, ChannelRegistry};
pub use transport::{
    memory::{MemoryConnector, MemoryPeer, PeerConnection},
    ws::WsConnector,
    Connector, Link,
};
