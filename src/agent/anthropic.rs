//! Claude-backed agent sessions
//!
//! Runs the tool-use loop against the Anthropic Messages API and reports
//! progress as session events. Tool calls are executed through the session's
//! [`ToolSet`] and their results fed back to the model on the next turn.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::SessionEvent;
use super::session::{AgentBackend, AgentSession, EventHub, EventStream, SessionConfig};
use super::tools::ToolSet;
use crate::config::Config;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are a meticulous reviewer of agent skills. \
    Explore the skill with the tools you are given before judging it. \
    Be specific and constructive.";

/// Content block in a Messages API exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Blocks this client does not act on (thinking, server tools)
    #[serde(other)]
    Unsupported,
}

/// Message in conversation
#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

impl Message {
    fn user(content: Vec<ContentBlock>) -> Self {
        Self { role: "user", content }
    }

    fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant",
            content,
        }
    }
}

/// API request
#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    system: &'a str,
    tools: &'a [Value],
    messages: &'a [Message],
}

/// API response
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl MessageResponse {
    /// Text blocks joined in order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Requested tool calls as `(id, name, input)`
    pub fn tool_calls(&self) -> Vec<(String, String, Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some((id.clone(), name.clone(), input.clone())),
                _ => None,
            })
            .collect()
    }

    /// Whether the model is waiting on tool results
    pub fn wants_tools(&self) -> bool {
        self.stop_reason.as_deref() == Some("tool_use") && !self.tool_calls().is_empty()
    }

    /// Content suitable for replaying as conversation history
    fn replayable(&self) -> Vec<ContentBlock> {
        self.content
            .iter()
            .filter(|b| !matches!(b, ContentBlock::Unsupported))
            .cloned()
            .collect()
    }
}

/// Thin Messages API client
#[derive(Clone)]
struct MessagesApi {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    max_tokens: usize,
}

impl MessagesApi {
    async fn complete(&self, tools: &[Value], messages: &[Message]) -> Result<MessageResponse> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT,
            tools,
            messages,
        };

        debug!("Calling Claude API: model={}, messages={}", self.model, messages.len());

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            bail!("Claude API error {}: {}", status, text);
        }

        Ok(response.json().await?)
    }
}

/// Creates Claude-backed review sessions
pub struct AnthropicBackend {
    client: Client,
    api_key: Option<String>,
    url: String,
    max_tokens: usize,
    max_turns: usize,
}

impl AnthropicBackend {
    pub fn new(api_key: Option<&str>, max_tokens: usize, max_turns: usize) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.map(|s| s.to_string()),
            url: ANTHROPIC_API_URL.to_string(),
            max_tokens,
            max_turns,
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.anthropic_api_key.as_deref(), config.max_tokens, config.max_turns)
    }

    /// Point at a different Messages endpoint (proxies, tests)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl AgentBackend for AnthropicBackend {
    async fn create_session(&self, config: SessionConfig) -> Result<Box<dyn AgentSession>> {
        let Some(api_key) = self.api_key.clone() else {
            bail!("ANTHROPIC_API_KEY not set - cannot start a review session");
        };
        if config.streaming {
            bail!("streaming sessions are not supported");
        }

        let api = MessagesApi {
            client: self.client.clone(),
            api_key,
            url: self.url.clone(),
            model: config.model,
            max_tokens: self.max_tokens,
        };

        Ok(Box::new(AnthropicSession {
            id: uuid::Uuid::new_v4().to_string(),
            api,
            tools: config.tools,
            max_turns: self.max_turns,
            hub: EventHub::new(),
            task: Mutex::new(None),
        }))
    }
}

/// One Claude conversation
pub struct AnthropicSession {
    id: String,
    api: MessagesApi,
    tools: Arc<ToolSet>,
    max_turns: usize,
    hub: EventHub,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl AgentSession for AnthropicSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    async fn send(&self, prompt: &str) -> Result<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            bail!("session {} is still working on a previous prompt", self.id);
        }

        let conversation = Conversation {
            api: self.api.clone(),
            tools: Arc::clone(&self.tools),
            hub: self.hub.clone(),
            max_turns: self.max_turns,
        };
        *task = Some(tokio::spawn(conversation.run(prompt.to_string())));
        Ok(())
    }

    async fn destroy(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.hub.close();
    }
}

/// The tool-use loop behind a session
struct Conversation {
    api: MessagesApi,
    tools: Arc<ToolSet>,
    hub: EventHub,
    max_turns: usize,
}

impl Conversation {
    async fn run(self, prompt: String) {
        let tool_defs = self.tools.to_claude_format();
        let mut messages = vec![Message::user(vec![ContentBlock::Text { text: prompt }])];

        for turn in 1..=self.max_turns {
            let response = match self.api.complete(&tool_defs, &messages).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Claude request failed on turn {}: {:#}", turn, e);
                    self.hub.emit(SessionEvent::Error {
                        message: format!("{:#}", e),
                    });
                    return;
                }
            };

            let text = response.text();
            if !text.is_empty() {
                self.hub.emit(SessionEvent::assistant(text));
            }

            if !response.wants_tools() {
                info!("Session finished after {} turn(s)", turn);
                self.hub.emit(SessionEvent::Idle);
                return;
            }

            let calls = response.tool_calls();
            messages.push(Message::assistant(response.replayable()));

            let mut results = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                self.hub.emit(SessionEvent::ToolExecutionStart {
                    tool_name: name.clone(),
                    arguments: input.clone(),
                });

                let result = self.tools.call(&name, input).await;

                self.hub.emit(SessionEvent::ToolExecutionEnd {
                    tool_name: name,
                    result: if result.success {
                        result.data.clone().unwrap_or(Value::Null)
                    } else {
                        json!({ "error": result.content })
                    },
                });

                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: result.content,
                    is_error: !result.success,
                });
            }
            messages.push(Message::user(results));
        }

        self.hub.emit(SessionEvent::Error {
            message: format!("no final answer after {} turns", self.max_turns),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn parse(raw: &str) -> MessageResponse {
        serde_json::from_str(raw).unwrap()
    }

    /// Body of one HTTP/1.1 request, sized by its Content-Length header
    async fn read_request_body(socket: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let start = end + 4;
                while buf.len() < start + len {
                    let n = socket.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "connection closed mid-body");
                    buf.extend_from_slice(&chunk[..n]);
                }
                return buf[start..start + len].to_vec();
            }
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-headers");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Local Messages endpoint answering each request with the next canned
    /// response. Returns its URL and the request bodies it has received.
    async fn mock_messages_api(responses: Vec<Value>) -> (String, Arc<Mutex<Vec<Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/messages", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let body = read_request_body(&mut socket).await;
                recorded.lock().push(serde_json::from_slice::<Value>(&body).unwrap());

                let payload = response.to_string();
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    payload.len(),
                    payload
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (url, requests)
    }

    /// Event kinds up to and including the first terminal event
    async fn collect_kinds(events: &mut EventStream) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        let collect = async {
            while let Some(event) = events.recv().await {
                kinds.push(event.kind());
                if event.is_terminal() {
                    break;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(10), collect)
            .await
            .expect("session never reached a terminal event");
        kinds
    }

    #[test]
    fn test_parse_tool_use_response() {
        let response = parse(
            r#"{
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "thinking", "thinking": "hmm", "signature": "x"},
                    {"type": "text", "text": "Let me look around."},
                    {"type": "tool_use", "id": "toolu_1", "name": "list_directory", "input": {"path": "/skills/demo"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }"#,
        );

        assert_eq!(response.text(), "Let me look around.");
        assert!(response.wants_tools());

        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "list_directory");
        assert_eq!(calls[0].2["path"], "/skills/demo");

        // Thinking blocks are not replayed
        assert_eq!(response.replayable().len(), 2);
    }

    #[test]
    fn test_end_turn_response() {
        let response = parse(
            r###"{"content": [{"type": "text", "text": "## Summary"}, {"type": "text", "text": "Solid."}], "stop_reason": "end_turn"}"###,
        );
        assert_eq!(response.text(), "## Summary\nSolid.");
        assert!(!response.wants_tools());
    }

    #[test]
    fn test_tool_result_serialization() {
        let ok = serde_json::to_value(ContentBlock::ToolResult {
            tool_use_id: "toolu_1".into(),
            content: "[]".into(),
            is_error: false,
        })
        .unwrap();
        assert_eq!(ok["type"], "tool_result");
        assert!(ok.get("is_error").is_none());

        let failed = serde_json::to_value(ContentBlock::ToolResult {
            tool_use_id: "toolu_2".into(),
            content: "File not found: x".into(),
            is_error: true,
        })
        .unwrap();
        assert_eq!(failed["is_error"], true);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_creation() {
        let backend = AnthropicBackend::new(None, 1024, 4);
        assert!(!backend.is_available());

        let config = SessionConfig::new("claude-sonnet-4-20250514", Arc::new(ToolSet::new()));
        let err = backend.create_session(config).await.err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_emits_error() {
        let backend = AnthropicBackend::new(Some("test-key"), 1024, 4).with_url("http://127.0.0.1:9/v1/messages");
        let config = SessionConfig::new("claude-sonnet-4-20250514", Arc::new(ToolSet::new()));
        let session = backend.create_session(config).await.unwrap();

        let mut events = session.subscribe();
        session.send("review please").await.unwrap();

        match events.recv().await {
            Some(SessionEvent::Error { message }) => assert!(!message.is_empty()),
            other => panic!("expected session.error, got {:?}", other),
        }

        session.destroy().await;
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_tool_loop_against_messages_endpoint() {
        let skill = tempfile::TempDir::new().unwrap();
        std::fs::write(skill.path().join("SKILL.md"), "# Demo").unwrap();

        let (url, requests) = mock_messages_api(vec![
            json!({
                "content": [
                    {"type": "text", "text": "Let me look around."},
                    {"type": "tool_use", "id": "toolu_1", "name": "list_directory",
                     "input": {"path": skill.path().display().to_string()}},
                    {"type": "tool_use", "id": "toolu_2", "name": "read_file", "input": {"path": 42}}
                ],
                "stop_reason": "tool_use"
            }),
            json!({
                "content": [{"type": "text", "text": "## Summary\nLooks good."}],
                "stop_reason": "end_turn"
            }),
        ])
        .await;

        let backend = AnthropicBackend::new(Some("test-key"), 1024, 4).with_url(url);
        let config = SessionConfig::new("claude-sonnet-4-20250514", Arc::new(ToolSet::new()));
        let session = backend.create_session(config).await.unwrap();

        let mut events = session.subscribe();
        session.send("review please").await.unwrap();

        assert_eq!(
            collect_kinds(&mut events).await,
            vec![
                "assistant.message",
                "tool.execution_start",
                "tool.execution_end",
                "tool.execution_start",
                "tool.execution_end",
                "assistant.message",
                "session.idle",
            ]
        );
        session.destroy().await;

        let requests = requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["messages"].as_array().unwrap().len(), 1);
        assert_eq!(requests[0]["tools"].as_array().unwrap().len(), 2);

        // Second turn replays the assistant turn and answers both calls
        let messages = requests[1]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");

        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0]["type"], "tool_result");
        assert_eq!(results[0]["tool_use_id"], "toolu_1");
        assert!(results[0].get("is_error").is_none());
        assert!(results[0]["content"].as_str().unwrap().contains("SKILL.md"));

        assert_eq!(results[1]["type"], "tool_result");
        assert_eq!(results[1]["tool_use_id"], "toolu_2");
        assert_eq!(results[1]["is_error"], true);
        assert!(results[1]["content"].as_str().unwrap().contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_turn_limit_emits_error() {
        let (url, requests) = mock_messages_api(vec![json!({
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "list_directory", "input": {"path": "/nonexistent-skill"}}],
            "stop_reason": "tool_use"
        })])
        .await;

        let backend = AnthropicBackend::new(Some("test-key"), 1024, 1).with_url(url);
        let config = SessionConfig::new("claude-sonnet-4-20250514", Arc::new(ToolSet::new()));
        let session = backend.create_session(config).await.unwrap();

        let mut events = session.subscribe();
        session.send("review please").await.unwrap();

        let mut kinds = Vec::new();
        let mut last_error = None;
        while let Some(event) = events.recv().await {
            kinds.push(event.kind());
            if let SessionEvent::Error { message } = &event {
                last_error = Some(message.clone());
            }
            if event.is_terminal() {
                break;
            }
        }

        assert_eq!(kinds, vec!["tool.execution_start", "tool.execution_end", "session.error"]);
        assert!(last_error.unwrap().contains("after 1 turns"));
        assert_eq!(requests.lock().len(), 1);
        session.destroy().await;
    }
}
