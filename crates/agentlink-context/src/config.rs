//! Context buffer configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Hard token budget. Depends on the model's context window.
    pub max_tokens: usize,
    /// Fraction of `max_tokens` that admission trims down to, leaving
    /// headroom for the next turn.
    pub trim_threshold: f64,
    /// Number of most recent messages that eviction never touches.
    pub keep_recent: usize,
    /// Characters per token used by the estimator.
    pub chars_per_token: usize,
    /// Fixed per-message cost for role and framing tokens.
    pub message_overhead: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            trim_threshold: 0.6,
            keep_recent: 3,
            chars_per_token: 4,
            message_overhead: 3,
        }
    }
}

impl ContextConfig {
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_trim_threshold(mut self, trim_threshold: f64) -> Self {
        self.trim_threshold = trim_threshold;
        self
    }

    pub fn with_keep_recent(mut self, keep_recent: usize) -> Self {
        self.keep_recent = keep_recent;
        self
    }

    /// Soft limit admission evicts down to.
    pub fn trim_target(&self) -> usize {
        let fraction = self.trim_threshold.clamp(0.0, 1.0);
        (self.max_tokens as f64 * fraction).floor() as usize
    }
}
