//! Skill Reviewer - Entry Point
//!
//! Reviews every skill under the skills directory and files one issue per
//! report. `--dry-run` prints the reports without filing anything.

use skill_reviewer::{AnthropicBackend, Config, GhCliTracker, Orchestrator, Publisher, ReviewController, RunOptions, ToolSet};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let opts = RunOptions::parse(std::env::args().skip(1));

    if opts.help {
        println!("Skill Reviewer v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: skill-reviewer [OPTIONS] [SKILLS_DIR]");
        println!();
        println!("Options:");
        println!("  --dry-run, -n      Print reports without creating issues");
        println!("  --limit, -l <N>    Review only the first N skills");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  ANTHROPIC_API_KEY                  Claude API key");
        println!("  SKILL_REVIEW_SKILLS_DIR            Skills directory (default: skills)");
        println!("  SKILL_REVIEW_MODEL                 Review model");
        println!("  SKILL_REVIEW_SESSION_TIMEOUT_SECS  Per-skill timeout (default: none)");
        println!("  SKILL_REVIEW_CONFINE_TOOLS         Keep tool paths inside the skills directory");
        println!("  SKILL_REVIEW_GITHUB_TOKEN          Token for gh (overrides GITHUB_TOKEN)");
        println!("  SKILL_REVIEW_REPO                  Repository to file issues in");
        println!("  SKILL_REVIEW_LABELS                Comma-separated issue labels");
        return Ok(());
    }

    // Reports go to stdout; logs to stderr
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Skill Reviewer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env()?;
    if let Some(dir) = opts.skills_dir.clone() {
        config.skills_dir = dir;
    }
    if let Some(source) = config.github.source {
        info!("GitHub token available from {}", source);
    }

    let tools = if config.confine_tools {
        ToolSet::confined_to(&config.skills_dir)
    } else {
        ToolSet::new()
    };

    let controller = ReviewController::new(
        Arc::new(AnthropicBackend::from_config(&config)),
        Arc::new(tools),
        config.model.clone(),
    )
    .with_timeout(config.session_timeout);

    let publisher = Publisher::new(Arc::new(GhCliTracker::from_config(&config))).with_labels(config.issue_labels.clone());

    let orchestrator = Orchestrator::new(config.skills_dir.clone(), controller, publisher);
    orchestrator.run(opts.limit, opts.dry_run).await?;

    Ok(())
}
