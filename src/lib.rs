//! Agentlink - bounded agent context and self-healing UI channels
//!
//! Re-exports the workspace crates and adds the host-facing glue:
//! TOML configuration and tracing setup.

pub mod config;
pub mod logging;

pub use agentlink_channel as channel;
pub use agentlink_context as context;

pub use agentlink_channel::{ChannelConfig, ChannelEndpoint, ChannelRegistry, SendOutcome};
pub use agentlink_context::{ContextBuffer, ContextConfig, TokenCounter};
pub use agentlink_core::{ConnectionState, Envelope, EnvelopeType, Error, Message, Result, Role};
pub use config::RuntimeConfig;
pub use logging::init_tracing;
