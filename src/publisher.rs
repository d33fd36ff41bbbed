//! Report Publisher
//!
//! Files a review as a GitHub issue, or describes what would be filed in
//! preview mode. Publishing never fails a run: tracker errors are logged and
//! reported back as [`PublishOutcome::Failed`].

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::{Config, GitHubCredentials};

/// Issue tracker errors
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// An issue to file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// External issue tracker
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create an issue and return its URL (or whatever the tracker prints)
    async fn create_issue(&self, issue: &IssueRequest) -> Result<String, PublishError>;
}

/// Issue tracker backed by the GitHub CLI
pub struct GhCliTracker {
    program: String,
    repo: Option<String>,
    credentials: GitHubCredentials,
}

impl GhCliTracker {
    pub fn new(repo: Option<String>, credentials: GitHubCredentials) -> Self {
        Self {
            program: "gh".to_string(),
            repo,
            credentials,
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.issue_repo.clone(), config.github.clone())
    }

    /// Use a different executable (wrappers, tests)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Check whether `gh` is already logged in
    async fn has_ambient_auth(&self) -> bool {
        match Command::new(&self.program)
            .args(["auth", "status"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    /// Arguments for `gh issue create`; the body is read from stdin
    fn create_args(&self, issue: &IssueRequest) -> Vec<String> {
        let mut args = vec![
            "issue".to_string(),
            "create".to_string(),
            "--title".to_string(),
            issue.title.clone(),
            "--body-file".to_string(),
            "-".to_string(),
        ];
        if let Some(repo) = &self.repo {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }
        for label in &issue.labels {
            args.push("--label".to_string());
            args.push(label.clone());
        }
        args
    }
}

#[async_trait]
impl IssueTracker for GhCliTracker {
    async fn create_issue(&self, issue: &IssueRequest) -> Result<String, PublishError> {
        let spawn_err = |source: io::Error| PublishError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(self.create_args(issue))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let (Some(token), Some(source)) = (&self.credentials.token, self.credentials.source) {
            if !self.has_ambient_auth().await {
                debug!("gh not logged in, using token from {}", source);
                cmd.env("GH_TOKEN", token);
            }
        }

        let mut child = cmd.spawn().map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading its body is reported by its exit status
            match stdin.write_all(issue.body.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("{} closed stdin before reading the issue body", self.program);
                }
                Err(e) => return Err(spawn_err(e)),
            }
            // Dropping stdin sends EOF
        }

        let output = child.wait_with_output().await.map_err(spawn_err)?;

        if !output.status.success() {
            return Err(PublishError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// What publishing a report did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Preview mode: description of the issue that would be filed
    Previewed(String),
    /// Issue filed; tracker output (usually the issue URL)
    Filed(String),
    /// Tracker failed; the error was logged
    Failed(String),
}

/// Title of the issue filed for a skill
pub fn issue_title(skill_name: &str) -> String {
    format!("Skill Review: {}", skill_name)
}

/// Publishes review reports through an issue tracker
pub struct Publisher {
    tracker: Arc<dyn IssueTracker>,
    labels: Vec<String>,
}

impl Publisher {
    pub fn new(tracker: Arc<dyn IssueTracker>) -> Self {
        Self {
            tracker,
            labels: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub async fn publish(&self, skill_name: &str, report: &str, preview_only: bool) -> PublishOutcome {
        let issue = IssueRequest {
            title: issue_title(skill_name),
            body: report.to_string(),
            labels: self.labels.clone(),
        };

        if preview_only {
            let description = format!(
                "[dry-run] Would create issue \"{}\" ({} chars)",
                issue.title,
                issue.body.chars().count()
            );
            info!("{}", description);
            return PublishOutcome::Previewed(description);
        }

        match self.tracker.create_issue(&issue).await {
            Ok(url) => {
                info!("Created issue for {}: {}", skill_name, url);
                PublishOutcome::Filed(url)
            }
            Err(e) => {
                error!("Failed to create issue for {}: {}", skill_name, e);
                PublishOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTracker {
        calls: Mutex<Vec<IssueRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl IssueTracker for RecordingTracker {
        async fn create_issue(&self, issue: &IssueRequest) -> Result<String, PublishError> {
            self.calls.lock().push(issue.clone());
            if self.fail {
                Err(PublishError::Failed {
                    program: "gh".into(),
                    status: "exit status: 1".into(),
                    stderr: "HTTP 401".into(),
                })
            } else {
                Ok("https://github.com/acme/skills/issues/7".into())
            }
        }
    }

    #[tokio::test]
    async fn test_preview_never_calls_tracker() {
        let tracker = Arc::new(RecordingTracker::default());
        let publisher = Publisher::new(tracker.clone());

        for report in ["## Summary\nFine", ""] {
            let outcome = publisher.publish("alpha", report, true).await;
            assert!(matches!(outcome, PublishOutcome::Previewed(ref d) if d.contains("Skill Review: alpha")));
        }
        assert!(tracker.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_files_issue() {
        let tracker = Arc::new(RecordingTracker::default());
        let publisher = Publisher::new(tracker.clone()).with_labels(vec!["skill-review".into()]);

        let outcome = publisher.publish("alpha", "report body", false).await;
        assert_eq!(outcome, PublishOutcome::Filed("https://github.com/acme/skills/issues/7".into()));

        let calls = tracker.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].title, "Skill Review: alpha");
        assert_eq!(calls[0].body, "report body");
        assert_eq!(calls[0].labels, vec!["skill-review"]);
    }

    #[tokio::test]
    async fn test_tracker_failure_is_not_propagated() {
        let tracker = Arc::new(RecordingTracker {
            fail: true,
            ..Default::default()
        });
        let outcome = Publisher::new(tracker).publish("alpha", "body", false).await;
        assert!(matches!(outcome, PublishOutcome::Failed(ref e) if e.contains("HTTP 401")));
    }

    #[test]
    fn test_gh_args() {
        let tracker = GhCliTracker::new(Some("acme/skills".into()), GitHubCredentials::default());
        let issue = IssueRequest {
            title: issue_title("beta"),
            body: "x".into(),
            labels: vec!["review".into()],
        };

        let args = tracker.create_args(&issue);
        assert_eq!(&args[..6], ["issue", "create", "--title", "Skill Review: beta", "--body-file", "-"]);
        assert!(args.windows(2).any(|w| w == ["--repo", "acme/skills"]));
        assert!(args.windows(2).any(|w| w == ["--label", "review"]));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let tracker = GhCliTracker::new(None, GitHubCredentials::default())
            .with_program("definitely-not-a-real-gh-binary");
        let issue = IssueRequest {
            title: issue_title("beta"),
            body: "x".into(),
            labels: vec![],
        };

        let err = tracker.create_issue(&issue).await.unwrap_err();
        assert!(matches!(err, PublishError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        // `false` ignores its arguments and exits 1
        let tracker = GhCliTracker::new(None, GitHubCredentials::default()).with_program("false");
        let issue = IssueRequest {
            title: issue_title("beta"),
            body: String::new(),
            labels: vec![],
        };

        let err = tracker.create_issue(&issue).await.unwrap_err();
        assert!(matches!(err, PublishError::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unread_body_reports_exit_status() {
        // Larger than a pipe buffer; `false` exits without reading it
        let tracker = GhCliTracker::new(None, GitHubCredentials::default()).with_program("false");
        let issue = IssueRequest {
            title: issue_title("beta"),
            body: "x".repeat(4 * 1024 * 1024),
            labels: vec![],
        };

        let err = tracker.create_issue(&issue).await.unwrap_err();
        assert!(matches!(err, PublishError::Failed { ref status, .. } if status.contains('1')));
    }

    /// Fake `gh` that logs `<subcommand> <action> <GH_TOKEN>` per call and exits 1
    #[cfg(unix)]
    fn logging_gh(dir: &std::path::Path) -> (String, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = dir.join("gh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$1 $2 ${{GH_TOKEN:-none}}\" >> '{}'\nexit 1\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script.display().to_string(), log)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_auth_status_only_checked_with_token() {
        let dir = tempfile::TempDir::new().unwrap();
        let (program, log) = logging_gh(dir.path());
        let issue = IssueRequest {
            title: issue_title("beta"),
            body: "body".into(),
            labels: vec![],
        };

        let anonymous = GhCliTracker::new(None, GitHubCredentials::default()).with_program(&program);
        assert!(anonymous.create_issue(&issue).await.is_err());
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().count(), 1);
        assert!(calls.starts_with("issue create"));

        std::fs::remove_file(&log).unwrap();
        let credentials = GitHubCredentials {
            token: Some("t0ken".into()),
            source: Some(crate::config::TOKEN_AMBIENT_VAR),
        };
        let with_token = GhCliTracker::new(None, credentials).with_program(&program);
        assert!(with_token.create_issue(&issue).await.is_err());
        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("auth status"));
        assert_eq!(calls[1], "issue create t0ken");
    }
}
