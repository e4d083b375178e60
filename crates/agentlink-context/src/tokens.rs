//! Approximate token accounting for messages

use agentlink_core::Message;

const DEFAULT_CHARS_PER_TOKEN: usize = 4;
const DEFAULT_MESSAGE_OVERHEAD: usize = 3;

/// Ceiling on the cost of a single message, so buffer totals cannot overflow.
pub const MAX_MESSAGE_TOKENS: usize = u32::MAX as usize;

/// Stateless token estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCounter {
    chars_per_token: usize,
    message_overhead: usize,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN, DEFAULT_MESSAGE_OVERHEAD)
    }
}

impl TokenCounter {
    pub fn new(chars_per_token: usize, message_overhead: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            message_overhead,
        }
    }

    pub fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    /// Token cost of a message. An authoritative count attached to the
    /// message wins over estimation.
    pub fn count(&self, message: &Message) -> usize {
        if let Some(tokens) = message.token_count {
            return tokens.min(MAX_MESSAGE_TOKENS);
        }

        let mut chars = message.content.chars().count();
        if let Some(ref id) = message.tool_call_id {
            chars += id.chars().count();
        }
        if let Some(ref calls) = message.tool_calls {
            chars += serde_json::to_string(calls)
                .map(|s| s.chars().count())
                .unwrap_or(0);
        }
        chars
            .div_ceil(self.chars_per_token)
            .saturating_add(self.message_overhead)
            .min(MAX_MESSAGE_TOKENS)
    }
}
