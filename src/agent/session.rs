//! Agent session interface
//!
//! A backend creates sessions; a session accepts a prompt and reports its
//! progress as a stream of [`SessionEvent`]s. The controller treats both as
//! opaque.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

use super::events::SessionEvent;
use super::tools::ToolSet;

/// Per-skill session failures
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to create session for {skill}: {reason}")]
    Create { skill: String, reason: String },
    #[error("Failed to send prompt for {skill}: {reason}")]
    Send { skill: String, reason: String },
    #[error("Session for {skill} failed: {message}")]
    Agent { skill: String, message: String },
    #[error("Event stream for {skill} closed before the session went idle")]
    StreamClosed { skill: String },
    #[error("Session for {skill} timed out after {limit:?}")]
    Timeout { skill: String, limit: Duration },
}

impl SessionError {
    /// Skill whose review failed
    pub fn skill(&self) -> &str {
        match self {
            Self::Create { skill, .. }
            | Self::Send { skill, .. }
            | Self::Agent { skill, .. }
            | Self::StreamClosed { skill }
            | Self::Timeout { skill, .. } => skill,
        }
    }
}

/// Settings a session is created with
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model identifier
    pub model: String,
    /// Tools the agent may call
    pub tools: Arc<ToolSet>,
    /// Streaming responses (review sessions keep this off)
    pub streaming: bool,
}

impl SessionConfig {
    pub fn new(model: impl Into<String>, tools: Arc<ToolSet>) -> Self {
        Self {
            model: model.into(),
            tools,
            streaming: false,
        }
    }
}

/// Receiving half of a session subscription
pub type EventStream = mpsc::UnboundedReceiver<SessionEvent>;

/// Creates agent sessions
#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn create_session(&self, config: SessionConfig) -> Result<Box<dyn AgentSession>>;
}

/// One conversation with the agent
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Session identifier, for logs
    fn id(&self) -> &str;

    /// Subscribe to events emitted from now on
    fn subscribe(&self) -> EventStream;

    /// Submit a prompt. Returns once the prompt is accepted, not when the
    /// agent is done with it.
    async fn send(&self, prompt: &str) -> Result<()>;

    /// Release the session. Closes every subscription.
    async fn destroy(&self);
}

/// Fan-out of session events to subscribers.
///
/// Cloning shares the same subscriber list.
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber
    pub fn emit(&self, event: SessionEvent) {
        trace!("Session event: {}", event.kind());
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Drop all subscribers, ending their streams
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
