//! Agent session orchestration and tool dispatch
//!
//! - Sandboxed tools (read-only filesystem access, schema-validated)
//! - Session interface (backend, session, event stream)
//! - Review controller (one session per skill, report latched on idle)
//! - Claude backend (Messages API tool-use loop)

pub mod anthropic;
pub mod controller;
pub mod events;
pub mod session;
pub mod tools;

pub use anthropic::AnthropicBackend;
pub use controller::{build_review_prompt, ReportLatch, ReviewController};
pub use events::SessionEvent;
pub use session::{AgentBackend, AgentSession, EventHub, EventStream, SessionConfig, SessionError};
pub use tools::{DirEntry, EntryType, SkillTool, ToolError, ToolResult, ToolSchema, ToolSet};
