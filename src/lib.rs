//! Skill Reviewer
//!
//! Agent-driven quality review of skill packages.
//!
//! # Features
//!
//! - **Sandboxed Tools**: read-only `list_directory` / `read_file`, schema-validated
//! - **Session Controller**: one agent session per skill, report latched on idle
//! - **Claude Backend**: Messages API tool-use loop
//! - **Publishing**: one GitHub issue per review via `gh`, or a dry-run preview
//!
//! # Architecture
//!
//! ```text
//! Orchestrator ──► Discovery (skills/*)
//!      │
//!      ├── for each skill ──► ReviewController ──► AgentBackend ──► Claude API
//!      │                            │                   │
//!      │                            │                   └── ToolSet (list/read)
//!      │                            └── SessionEvent stream ──► ReportLatch
//!      │
//!      └── Publisher ──► IssueTracker (gh issue create)
//! ```

pub mod agent;
pub mod config;
pub mod discovery;
pub mod orchestrator;
pub mod publisher;

pub use agent::{AgentBackend, AgentSession, AnthropicBackend, ReviewController, SessionError, SessionEvent, ToolSet};
pub use config::{Config, GitHubCredentials, RunOptions};
pub use discovery::{discover_skills, DiscoveryError, Skill};
pub use orchestrator::{Orchestrator, RunSummary};
pub use publisher::{GhCliTracker, IssueTracker, PublishError, PublishOutcome, Publisher};
