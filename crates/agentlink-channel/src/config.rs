//! Channel endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Interval between heartbeats while connected, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Delay before each reconnect attempt, in milliseconds.
    pub reconnect_backoff_ms: u64,
    /// Auto-reconnect setting in effect before the first `connect`.
    /// Governs whether sends on a never-connected endpoint are queued.
    pub auto_reconnect: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            reconnect_backoff_ms: 1_000,
            auto_reconnect: false,
        }
    }
}

impl ChannelConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }
}
