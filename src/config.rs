//! Configuration management

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Credential override checked first
pub const TOKEN_OVERRIDE_VAR: &str = "SKILL_REVIEW_GITHUB_TOKEN";
/// Ambient credential used when no override is set
pub const TOKEN_AMBIENT_VAR: &str = "GITHUB_TOKEN";

/// GitHub credential for the issue tracker, resolved once at startup
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GitHubCredentials {
    pub token: Option<String>,
    /// Variable the token came from
    pub source: Option<&'static str>,
}

impl GitHubCredentials {
    /// First non-empty of the override and ambient variables
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        for var in [TOKEN_OVERRIDE_VAR, TOKEN_AMBIENT_VAR] {
            if let Some(token) = lookup(var).filter(|t| !t.trim().is_empty()) {
                return Self {
                    token: Some(token),
                    source: Some(var),
                };
            }
        }
        Self::default()
    }
}

// Never print the token itself
impl std::fmt::Debug for GitHubCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubCredentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .finish()
    }
}

/// Reviewer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one subdirectory per skill
    pub skills_dir: PathBuf,

    /// Model used for review sessions
    pub model: String,

    /// Anthropic API key (required to start sessions)
    pub anthropic_api_key: Option<String>,

    /// Max tokens per model response
    pub max_tokens: usize,

    /// Max model turns per review before giving up
    pub max_turns: usize,

    /// Per-session timeout; `None` waits indefinitely
    pub session_timeout: Option<Duration>,

    /// Reject tool paths outside `skills_dir`
    pub confine_tools: bool,

    /// Credential for `gh`
    pub github: GitHubCredentials,

    /// `owner/repo` to file issues in (defaults to the current repo)
    pub issue_repo: Option<String>,

    /// Labels added to filed issues
    pub issue_labels: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let skills_dir = lookup("SKILL_REVIEW_SKILLS_DIR")
            .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
            .unwrap_or_else(|| PathBuf::from("skills"));

        let model = lookup("SKILL_REVIEW_MODEL").unwrap_or_else(|| "claude-sonnet-4-20250514".to_string());

        let anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty());

        let max_tokens = lookup("SKILL_REVIEW_MAX_TOKENS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(8192);

        let max_turns = lookup("SKILL_REVIEW_MAX_TURNS")
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(40);

        let session_timeout = lookup("SKILL_REVIEW_SESSION_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let confine_tools = lookup("SKILL_REVIEW_CONFINE_TOOLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let github = GitHubCredentials::resolve(&lookup);

        let issue_repo = lookup("SKILL_REVIEW_REPO").filter(|r| !r.is_empty());

        let issue_labels = lookup("SKILL_REVIEW_LABELS")
            .map(|v| {
                v.split(',')
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            skills_dir,
            model,
            anthropic_api_key,
            max_tokens,
            max_turns,
            session_timeout,
            confine_tools,
            github,
            issue_repo,
            issue_labels,
        })
    }
}

/// Per-run options from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Print reports without filing issues
    pub dry_run: bool,
    /// Review only the first N skills
    pub limit: Option<usize>,
    /// Skills root overriding the configured one
    pub skills_dir: Option<PathBuf>,
    pub help: bool,
}

impl RunOptions {
    /// Parse arguments (without the program name).
    ///
    /// A missing or non-numeric limit means no limit.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut opts = Self::default();
        let mut args = args.into_iter().map(|a| a.as_ref().to_string()).peekable();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--dry-run" | "-n" => opts.dry_run = true,
                "--help" | "-h" => opts.help = true,
                "--limit" | "-l" => {
                    let value = args.next_if(|v| !v.starts_with('-'));
                    opts.limit = value.and_then(|v| v.parse().ok());
                }
                other => {
                    if let Some(value) = other.strip_prefix("--limit=") {
                        opts.limit = value.parse().ok();
                    } else if !other.starts_with('-') {
                        opts.skills_dir = Some(PathBuf::from(shellexpand::tilde(other).into_owned()));
                    }
                }
            }
        }

        opts
    }
}
