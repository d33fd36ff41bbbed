//! Agent Session Controller
//!
//! Runs one review per skill:
//!
//! ```text
//! create session ─► subscribe ─► send prompt ─► route events ─► idle ─► destroy
//!                       │                            │
//!                       └──────── pump task ─────────┘
//! ```
//!
//! The controller never looks at tool results. Its only output is the last
//! assistant message seen before the session goes idle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::events::SessionEvent;
use super::session::{AgentBackend, AgentSession, EventStream, SessionConfig, SessionError};
use super::tools::ToolSet;

/// Instructions sent with every review; `{skill_path}` is substituted
const REVIEW_TEMPLATE: &str = r#"You are reviewing an agent skill located at: {skill_path}

A skill is a package made of a SKILL.md manifest plus supporting reference files and scripts.

Follow these steps:
1. Use list_directory on the skill path to see its structure.
2. Use read_file to read SKILL.md.
3. Explore and read the reference files and scripts the manifest relies on.
4. Assess clarity of the instructions, completeness, correctness of examples, and the quality of any scripts.

When you have finished exploring, respond with a report in Markdown using exactly these sections:

## Summary
A short overview of what the skill does and its overall quality.

## Strengths
What the skill does well.

## Areas for Improvement
Specific problems, gaps, or ambiguities, each with a concrete suggestion.

## Priority Actions
The three to five most valuable changes, in priority order.

## Code Quality
An assessment of the scripts and code samples, or a note that there are none.

Only output the report in your final message."#;

/// Build the task prompt for one skill
pub fn build_review_prompt(skill_path: &Path) -> String {
    REVIEW_TEMPLATE.replace("{skill_path}", &skill_path.display().to_string())
}

/// How a session ended
type Settlement = Result<String, String>;

/// Single-assignment report cell fed by session events.
///
/// Assistant messages overwrite the working text. The first idle settles the
/// cell with that text; anything after it is ignored.
pub struct ReportLatch {
    working: String,
    settle: Option<oneshot::Sender<Settlement>>,
}

impl ReportLatch {
    pub fn new() -> (Self, oneshot::Receiver<Settlement>) {
        let (tx, rx) = oneshot::channel();
        let latch = Self {
            working: String::new(),
            settle: Some(tx),
        };
        (latch, rx)
    }

    pub fn is_settled(&self) -> bool {
        self.settle.is_none()
    }

    /// Current report text
    pub fn working(&self) -> &str {
        &self.working
    }

    pub fn observe(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ToolExecutionStart { tool_name, arguments } => {
                debug!("Tool call: {} {}", tool_name, arguments);
            }
            SessionEvent::ToolExecutionEnd { tool_name, .. } => {
                debug!("Tool returned: {}", tool_name);
            }
            SessionEvent::AssistantMessage { content } => {
                if !self.is_settled() {
                    self.working = content;
                }
            }
            SessionEvent::Idle => {
                if let Some(tx) = self.settle.take() {
                    // Receiver gone means the caller stopped waiting
                    let _ = tx.send(Ok(self.working.clone()));
                }
            }
            SessionEvent::Error { message } => {
                if let Some(tx) = self.settle.take() {
                    let _ = tx.send(Err(message));
                }
            }
        }
    }
}

/// Feed every event of a subscription into the latch, in order
async fn route_events(mut events: EventStream, mut latch: ReportLatch) {
    while let Some(event) = events.recv().await {
        latch.observe(event);
    }
}

/// Drives review sessions against an agent backend
pub struct ReviewController {
    backend: Arc<dyn AgentBackend>,
    tools: Arc<ToolSet>,
    model: String,
    timeout: Option<Duration>,
}

impl ReviewController {
    pub fn new(backend: Arc<dyn AgentBackend>, tools: Arc<ToolSet>, model: impl Into<String>) -> Self {
        Self {
            backend,
            tools,
            model: model.into(),
            timeout: None,
        }
    }

    /// Bound each review. `None` waits for the session indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Review one skill and return the agent's report text.
    ///
    /// An empty report means the session went idle without saying anything.
    pub async fn review_skill(&self, skill_name: &str, skill_path: &Path) -> Result<String, SessionError> {
        let config = SessionConfig::new(self.model.clone(), Arc::clone(&self.tools));
        let session = self
            .backend
            .create_session(config)
            .await
            .map_err(|e| SessionError::Create {
                skill: skill_name.to_string(),
                reason: format!("{:#}", e),
            })?;

        info!("Session {} started for {} (model={})", session.id(), skill_name, self.model);

        let result = self.run_session(session.as_ref(), skill_name, skill_path).await;

        session.destroy().await;
        debug!("Session {} destroyed", session.id());

        if let Err(e) = &result {
            warn!("Review of {} failed: {}", skill_name, e);
        }
        result
    }

    async fn run_session(
        &self,
        session: &dyn AgentSession,
        skill_name: &str,
        skill_path: &Path,
    ) -> Result<String, SessionError> {
        // Subscribe before sending so no event can be missed
        let events = session.subscribe();
        let (latch, settled) = ReportLatch::new();
        let pump = tokio::spawn(route_events(events, latch));

        let prompt = build_review_prompt(skill_path);
        let exchange = async {
            session.send(&prompt).await.map_err(|e| SessionError::Send {
                skill: skill_name.to_string(),
                reason: format!("{:#}", e),
            })?;
            Ok::<_, SessionError>(settled.await)
        };

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or_else(|_| {
                    Err(SessionError::Timeout {
                        skill: skill_name.to_string(),
                        limit,
                    })
                }),
            None => exchange.await,
        };

        pump.abort();

        match outcome? {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(message)) => Err(SessionError::Agent {
                skill: skill_name.to_string(),
                message,
            }),
            Err(_) => Err(SessionError::StreamClosed {
                skill: skill_name.to_string(),
            }),
        }
    }
}
