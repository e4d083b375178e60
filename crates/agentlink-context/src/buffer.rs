//! Budget-bounded conversation buffer with role-aware eviction
//!
//! Messages are admitted unconditionally. Before each insertion the buffer
//! evicts older messages, lowest tier first, until the new message fits under
//! the trim target. The most recent `keep_recent` messages are never evicted,
//! and `system` is only ever replaced, never evicted.

use crate::config::ContextConfig;
use crate::tokens::TokenCounter;
use agentlink_core::{Message, Role};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct MessageEntry {
    message: Message,
    /// Computed once at admission; only content replacement recomputes it.
    token_cost: usize,
}

#[derive(Debug)]
pub struct ContextBuffer {
    config: ContextConfig,
    counter: TokenCounter,
    entries: Vec<MessageEntry>,
    running_total: usize,
}

impl Default for ContextBuffer {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl ContextBuffer {
    pub fn new(config: ContextConfig) -> Self {
        let counter = TokenCounter::new(config.chars_per_token, config.message_overhead);
        Self {
            config,
            counter,
            entries: Vec::new(),
            running_total: 0,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Append a message.
    pub fn add(&mut self, message: Message) {
        self.admit(message, None);
    }

    /// Insert a message at `position` (clamped to the buffer length after
    /// eviction). Used to re-assert a system message at index 0.
    pub fn insert(&mut self, message: Message, position: usize) {
        self.admit(message, Some(position));
    }

    fn admit(&mut self, message: Message, position: Option<usize>) {
        let cost = self.counter.count(&message);
        let role = message.role;

        if role.is_singleton() {
            self.remove(role);
        }

        let trim_target = self.config.trim_target();
        if self.running_total.saturating_add(cost) > trim_target {
            self.evict_down_to(trim_target.saturating_sub(cost));
        }

        let entry = MessageEntry {
            message,
            token_cost: cost,
        };
        match position {
            Some(pos) => {
                let pos = pos.min(self.entries.len());
                self.entries.insert(pos, entry);
            }
            None => self.entries.push(entry),
        }
        self.running_total = self.running_total.saturating_add(cost);

        if self.running_total > trim_target {
            debug!(
                "Context over trim target after admitting {}: ~{} / {} tokens",
                role, self.running_total, trim_target
            );
        }
        self.check_invariants();
    }

    /// Remove every message with `role`. Returns how many were removed.
    pub fn remove(&mut self, role: Role) -> usize {
        let before = self.entries.len();
        let mut freed = 0;
        self.entries.retain(|e| {
            if e.message.role == role {
                freed += e.token_cost;
                false
            } else {
                true
            }
        });
        self.running_total -= freed;
        self.check_invariants();
        before - self.entries.len()
    }

    /// Pop the most recently added message.
    pub fn remove_last(&mut self) -> bool {
        match self.entries.pop() {
            Some(entry) => {
                self.running_total -= entry.token_cost;
                self.check_invariants();
                true
            }
            None => false,
        }
    }

    /// Replace the content of the most recent message with `role`, typically
    /// the assistant message being streamed. Any authoritative token count is
    /// dropped since it no longer describes the content.
    pub fn replace_content(&mut self, role: Role, content: impl Into<String>) -> bool {
        let Some(index) = self.entries.iter().rposition(|e| e.message.role == role) else {
            return false;
        };

        let entry = &mut self.entries[index];
        entry.message.content = content.into();
        entry.message.token_count = None;
        let new_cost = self.counter.count(&entry.message);
        let old_cost = std::mem::replace(&mut entry.token_cost, new_cost);
        self.running_total = (self.running_total - old_cost).saturating_add(new_cost);

        self.check_invariants();
        true
    }

    /// Append `delta` to the most recent message with `role`.
    pub fn append_content(&mut self, role: Role, delta: &str) -> bool {
        let Some(current) = self
            .entries
            .iter()
            .rev()
            .find(|e| e.message.role == role)
            .map(|e| e.message.content.clone())
        else {
            return false;
        };
        self.replace_content(role, current + delta)
    }

    /// Independent buffer with the same configuration, optionally carrying a
    /// copy of the current history.
    pub fn fork(&self, include_history: bool) -> ContextBuffer {
        let mut forked = ContextBuffer::new(self.config.clone());
        if include_history {
            forked.entries = self.entries.clone();
            forked.running_total = self.running_total;
        }
        forked.check_invariants();
        forked
    }

    /// Change the hard budget, evicting immediately if usage exceeds it.
    pub fn set_budget(&mut self, max_tokens: usize) {
        self.config.max_tokens = max_tokens;
        if self.running_total > max_tokens {
            self.evict_down_to(max_tokens);
        }
        self.check_invariants();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.running_total = 0;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    pub fn messages_with_role(&self, role: Role) -> Vec<Message> {
        self.iter().filter(|m| m.role == role).cloned().collect()
    }

    pub fn contains_role(&self, role: Role) -> bool {
        self.iter().any(|m| m.role == role)
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last().map(|e| &e.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.running_total
    }

    pub fn max_tokens(&self) -> usize {
        self.config.max_tokens
    }

    pub fn remaining_tokens(&self) -> usize {
        self.config.max_tokens.saturating_sub(self.running_total)
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Evict until `running_total <= target` or nothing evictable remains.
    fn evict_down_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        let mut freed = 0;

        while self.running_total > target {
            let Some(index) = self.eviction_candidate() else {
                break;
            };
            let entry = self.entries.remove(index);
            self.running_total -= entry.token_cost;
            freed += entry.token_cost;
            evicted += 1;
            debug!(
                "Evicted {} message at {} (~{} tokens)",
                entry.message.role, index, entry.token_cost
            );
        }

        if evicted > 0 {
            info!(
                "Trimmed context: evicted {} messages (~{} tokens), {} messages, ~{} tokens left",
                evicted,
                freed,
                self.entries.len(),
                self.running_total
            );
        }
        evicted
    }

    /// Oldest message of the lowest non-empty tier outside the keep-recent
    /// window.
    fn eviction_candidate(&self) -> Option<usize> {
        let evictable = self.entries.len().saturating_sub(self.config.keep_recent);
        self.entries[..evictable]
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.message.role.eviction_tier().map(|tier| (tier, i)))
            .min()
            .map(|(_, i)| i)
    }

    fn check_invariants(&self) {
        debug_assert_eq!(
            self.running_total,
            self.entries
                .iter()
                .fold(0usize, |acc, e| acc.saturating_add(e.token_cost)),
            "running total drifted from cached entry costs"
        );
        debug_assert!(
            Role::ALL
                .iter()
                .filter(|r| r.is_singleton())
                .all(|r| self.entries.iter().filter(|e| e.message.role == *r).count() <= 1),
            "singleton role present more than once"
        );
    }
}
