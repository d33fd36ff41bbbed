//! Sandboxed Tool Set
//!
//! The fixed capabilities an agent session may call while reviewing a skill:
//! - `list_directory`: immediate children of a directory
//! - `read_file`: full UTF-8 contents of a file
//!
//! Both are read-only. Arguments are checked against the declared JSON schema
//! before a handler runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Tool errors, returned to the agent as failed tool results
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("File is not valid UTF-8: {0}")]
    NotUtf8(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Path escapes the review root: {0}")]
    OutsideRoot(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// Schema mismatch or unknown tool, as opposed to a failure inside a handler
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Self::UnknownTool(_) | Self::InvalidArguments { .. })
    }
}

/// Result type for tool calls
pub type ToolOutcome<T> = Result<T, ToolError>;

/// JSON Schema for tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name (snake_case)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: Value,
    /// Required parameter names
    pub required: Vec<String>,
}

impl ToolSchema {
    /// Create a new tool schema
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            required: vec![],
        }
    }

    /// Add a string parameter
    pub fn with_string_param(mut self, name: &str, description: &str, required: bool) -> Self {
        if let Some(props) = self.parameters.get_mut("properties") {
            props[name] = serde_json::json!({
                "type": "string",
                "description": description
            });
        }
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Validate parameters against schema
    pub fn validate(&self, params: &Value) -> ToolOutcome<()> {
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        };

        if !params.is_object() {
            return Err(invalid("arguments must be a JSON object".to_string()));
        }

        for req in &self.required {
            if params.get(req).is_none() {
                return Err(invalid(format!("missing required parameter '{}'", req)));
            }
        }

        if let Some(props) = self.parameters.get("properties").and_then(|p| p.as_object()) {
            for (name, schema) in props {
                let Some(value) = params.get(name) else {
                    continue;
                };
                let expected_type = schema.get("type").and_then(|t| t.as_str());
                let valid = match expected_type {
                    Some("string") => value.is_string(),
                    Some("integer") => value.is_i64(),
                    Some("number") => value.is_number(),
                    Some("boolean") => value.is_boolean(),
                    Some("array") => value.is_array(),
                    Some("object") => value.is_object(),
                    _ => true,
                };
                if !valid {
                    return Err(invalid(format!(
                        "parameter '{}' has wrong type, expected {}",
                        name,
                        expected_type.unwrap_or("unknown")
                    )));
                }
            }
        }

        Ok(())
    }

    /// Format as Claude-compatible tool definition
    pub fn to_claude_format(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "input_schema": {
                "type": "object",
                "properties": self.parameters.get("properties").cloned().unwrap_or(Value::Object(Default::default())),
                "required": self.required
            }
        })
    }
}

/// Result from tool execution, as fed back into the agent loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool name that was called
    pub tool_name: String,
    /// Whether execution succeeded
    pub success: bool,
    /// Result content (serialized value or error message)
    pub content: String,
    /// Structured result data
    pub data: Option<Value>,
}

impl ToolResult {
    /// Create a successful result with data
    pub fn success_with_data(tool_name: &str, content: String, data: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: true,
            content,
            data: Some(data),
        }
    }

    /// Create an error result
    pub fn error(tool_name: &str, error: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: false,
            content: error,
            data: None,
        }
    }
}

/// The closed set of capabilities exposed to a review session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkillTool {
    ListDirectory,
    ReadFile,
}

impl SkillTool {
    pub const ALL: [SkillTool; 2] = [SkillTool::ListDirectory, SkillTool::ReadFile];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListDirectory => "list_directory",
            Self::ReadFile => "read_file",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn schema(&self) -> ToolSchema {
        match self {
            Self::ListDirectory => ToolSchema::new(
                self.name(),
                "List the files and subdirectories directly inside a directory",
            )
            .with_string_param("path", "Path of the directory to list", true),
            Self::ReadFile => ToolSchema::new(self.name(), "Read the full text contents of a file")
                .with_string_param("path", "Path of the file to read", true),
        }
    }
}

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// One child returned by `list_directory`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

/// Read-only tool set shared by every session.
///
/// Holds no mutable state. With a root set, every requested path must
/// resolve inside it.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    root: Option<PathBuf>,
}

impl ToolSet {
    /// Tool set with no path containment
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Tool set that rejects paths resolving outside `root`
    pub fn confined_to(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!("Tool paths confined to {}", root.display());
        Self { root: Some(root) }
    }

    /// Format all tools for Claude API
    pub fn to_claude_format(&self) -> Vec<Value> {
        SkillTool::ALL
            .iter()
            .map(|t| t.schema().to_claude_format())
            .collect()
    }

    /// Validate and run a tool call by name
    pub async fn execute(&self, name: &str, params: Value) -> ToolOutcome<Value> {
        let tool = SkillTool::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.schema().validate(&params)?;

        let args: PathArgs = serde_json::from_value(params).map_err(|e| ToolError::InvalidArguments {
            tool: name.to_string(),
            reason: e.to_string(),
        })?;

        match tool {
            SkillTool::ListDirectory => {
                let entries = self.list_directory(&args.path).await?;
                Ok(serde_json::to_value(entries).unwrap_or(Value::Array(vec![])))
            }
            SkillTool::ReadFile => Ok(Value::String(self.read_file(&args.path).await?)),
        }
    }

    /// Execute a call and wrap the outcome as a `ToolResult`
    pub async fn call(&self, name: &str, params: Value) -> ToolResult {
        match self.execute(name, params).await {
            Ok(Value::String(text)) => ToolResult::success_with_data(name, text.clone(), Value::String(text)),
            Ok(data) => ToolResult::success_with_data(name, data.to_string(), data),
            Err(e) => {
                debug!("Tool {} failed: {}", name, e);
                ToolResult::error(name, e.to_string())
            }
        }
    }

    /// Immediate children of `path`, in listing order
    pub async fn list_directory(&self, path: &str) -> ToolOutcome<Vec<DirEntry>> {
        let dir = self.resolve(path, ToolError::DirectoryNotFound).await?;

        let meta = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| io_error(path, e, ToolError::DirectoryNotFound))?;
        if !meta.is_dir() {
            return Err(ToolError::NotADirectory(path.to_string()));
        }

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_error(path, e, ToolError::DirectoryNotFound))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| io_error(path, e, ToolError::DirectoryNotFound))?
        {
            // Follow symlinks; a dangling link lists as a file
            let is_dir = tokio::fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                entry_type: if is_dir { EntryType::Directory } else { EntryType::File },
            });
        }

        Ok(entries)
    }

    /// Full contents of `path` as UTF-8 text
    pub async fn read_file(&self, path: &str) -> ToolOutcome<String> {
        let file = self.resolve(path, ToolError::FileNotFound).await?;

        let meta = tokio::fs::metadata(&file)
            .await
            .map_err(|e| io_error(path, e, ToolError::FileNotFound))?;
        if meta.is_dir() {
            return Err(ToolError::NotAFile(path.to_string()));
        }

        let bytes = tokio::fs::read(&file)
            .await
            .map_err(|e| io_error(path, e, ToolError::FileNotFound))?;

        String::from_utf8(bytes).map_err(|_| ToolError::NotUtf8(path.to_string()))
    }

    /// Apply the containment root, if configured
    async fn resolve(&self, path: &str, not_found: fn(String) -> ToolError) -> ToolOutcome<PathBuf> {
        let requested = PathBuf::from(path);
        let Some(root) = &self.root else {
            return Ok(requested);
        };

        let canonical_root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| io_error(&root.display().to_string(), e, ToolError::DirectoryNotFound))?;
        let canonical = tokio::fs::canonicalize(&requested)
            .await
            .map_err(|e| io_error(path, e, not_found))?;

        if !canonical.starts_with(&canonical_root) {
            return Err(ToolError::OutsideRoot(path.to_string()));
        }
        Ok(canonical)
    }
}

fn io_error(path: &str, err: io::Error, not_found: fn(String) -> ToolError) -> ToolError {
    match err.kind() {
        io::ErrorKind::NotFound => not_found(path.to_string()),
        io::ErrorKind::PermissionDenied => ToolError::PermissionDenied(path.to_string()),
        _ => ToolError::Io {
            path: path.to_string(),
            source: err,
        },
    }
}
