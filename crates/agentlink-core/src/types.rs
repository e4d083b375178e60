//! Core types for Agentlink

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Process-assigned identifier of an attached channel - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Allocate a fresh random identifier.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Message role
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "tool-result")]
    ToolResult,
    #[serde(rename = "browser-state-snapshot")]
    BrowserState,
    #[serde(rename = "todo-list-snapshot")]
    TodoList,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::System,
        Role::Human,
        Role::Assistant,
        Role::ToolResult,
        Role::BrowserState,
        Role::TodoList,
    ];

    /// Roles of which a context holds at most one message at a time.
    pub fn is_singleton(self) -> bool {
        matches!(self, Role::System | Role::BrowserState | Role::TodoList)
    }

    /// Eviction priority. Lower tiers are dropped first; `None` means the
    /// role is never evicted under budget pressure.
    pub fn eviction_tier(self) -> Option<u8> {
        match self {
            Role::Assistant => Some(0),
            Role::ToolResult => Some(1),
            Role::Human => Some(2),
            Role::BrowserState => Some(3),
            Role::TodoList => Some(4),
            Role::System => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::ToolResult => "tool-result",
            Role::BrowserState => "browser-state-snapshot",
            Role::TodoList => "todo-list-snapshot",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Authoritative token count, e.g. reported back by a model call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            token_count: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::ToolResult, content)
        }
    }

    pub fn browser_state(content: impl Into<String>) -> Self {
        Self::new(Role::BrowserState, content)
    }

    pub fn todo_list(content: impl Into<String>) -> Self {
        Self::new(Role::TodoList, content)
    }

    /// Attach an authoritative token count, overriding estimation.
    pub fn with_token_count(mut self, tokens: usize) -> Self {
        self.token_count = Some(tokens);
        self
    }
}

/// A tool call from the assistant
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Lifecycle state of a channel endpoint
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Reconnecting => f.write_str("reconnecting"),
        }
    }
}
