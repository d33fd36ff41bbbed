//! Session event protocol
//!
//! Everything an agent session reports back while it works. Events are
//! consumed in emission order and never persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by an agent session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// The agent is invoking a tool.
    #[serde(rename = "tool.execution_start")]
    ToolExecutionStart { tool_name: String, arguments: Value },

    /// A tool call returned. The result is fed back to the agent by the session.
    #[serde(rename = "tool.execution_end")]
    ToolExecutionEnd { tool_name: String, result: Value },

    /// Accumulated assistant response text.
    #[serde(rename = "assistant.message")]
    AssistantMessage { content: String },

    /// The session has no further pending work.
    #[serde(rename = "session.idle")]
    Idle,

    /// The session failed and will not reach idle.
    #[serde(rename = "session.error")]
    Error { message: String },
}

impl SessionEvent {
    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolExecutionStart { .. } => "tool.execution_start",
            Self::ToolExecutionEnd { .. } => "tool.execution_end",
            Self::AssistantMessage { .. } => "assistant.message",
            Self::Idle => "session.idle",
            Self::Error { .. } => "session.error",
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::AssistantMessage {
            content: content.into(),
        }
    }

    /// Ends the wait for a report
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Error { .. })
    }
}
