//! Tracing setup for hosts embedding agentlink

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Info-level logging for every agentlink crate.
pub const DEFAULT_FILTER: &str = "agentlink=info,agentlink_context=info,agentlink_channel=info";

/// Install a global subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Does nothing if a subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
