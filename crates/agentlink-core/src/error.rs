//! Error types for Agentlink

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("connect failed: {name} - {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn connect_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Transport-level failures are retried through the transmit queue and
    /// never reach the caller of `send`.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::ConnectionClosed(_) | Self::IoError(_)
        )
    }
}
