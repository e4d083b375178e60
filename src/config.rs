//! Runtime configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.
//!
//! ```toml
//! [context]
//! max_tokens = 8192
//! trim_threshold = 0.6
//! keep_recent = 3
//!
//! [channel]
//! heartbeat_interval_ms = 5000
//! reconnect_backoff_ms = 1000
//! ```

use agentlink_channel::ChannelConfig;
use agentlink_context::ContextConfig;
use agentlink_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Context buffer budget and eviction parameters.
    pub context: ContextConfig,
    /// Channel liveness and reconnect parameters.
    pub channel: ChannelConfig,
}

impl RuntimeConfig {
    /// Load from `path`, using defaults when the file is missing or malformed.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.context.trim_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::ConfigError(format!(
                "context.trim_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.context.chars_per_token == 0 {
            return Err(Error::ConfigError(
                "context.chars_per_token must be positive".into(),
            ));
        }
        if self.channel.heartbeat_interval_ms == 0 {
            return Err(Error::ConfigError(
                "channel.heartbeat_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
