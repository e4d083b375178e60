//! Agentlink Context - Token accounting and a budget-bounded conversation buffer

pub mod buffer;
pub mod config;
pub mod tokens;

pub use buffer::ContextBuffer;
pub use config::ContextConfig;
pub use tokens::{TokenCounter, MAX_MESSAGE_TOKENS};
