//! Review run orchestration
//!
//! discover → limit → for each skill: review → print → publish
//!
//! Skills are handled one at a time. A failed review or publish is logged
//! and the run moves on to the next skill; only discovery failure ends it.

use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::agent::ReviewController;
use crate::discovery::{discover_skills, DiscoveryError, Skill};
use crate::publisher::{PublishOutcome, Publisher};

/// Counters for one run (informational)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub reviewed: usize,
    pub failed: usize,
    pub filed: usize,
}

/// Stdout block for one report
pub fn render_report_block(skill_name: &str, report: &str) -> String {
    format!("--- REPORT: {} ---\n{}\n--- END REPORT ---", skill_name, report)
}

/// Keep the first `limit` skills, if a limit is set
pub fn apply_limit(mut skills: Vec<Skill>, limit: Option<usize>) -> Vec<Skill> {
    if let Some(n) = limit {
        skills.truncate(n);
    }
    skills
}

/// Sequences discovery, review, and publishing
pub struct Orchestrator {
    skills_dir: PathBuf,
    controller: ReviewController,
    publisher: Publisher,
}

impl Orchestrator {
    pub fn new(skills_dir: impl Into<PathBuf>, controller: ReviewController, publisher: Publisher) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            controller,
            publisher,
        }
    }

    pub async fn run(&self, limit: Option<usize>, dry_run: bool) -> Result<RunSummary, DiscoveryError> {
        let discovered = discover_skills(&self.skills_dir).await?;
        let mut summary = RunSummary {
            discovered: discovered.len(),
            ..Default::default()
        };

        let skills = apply_limit(discovered, limit);
        info!(
            "Reviewing {} of {} skill(s) in {}{}",
            skills.len(),
            summary.discovered,
            self.skills_dir.display(),
            if dry_run { " (dry run)" } else { "" }
        );

        for (i, skill) in skills.iter().enumerate() {
            info!("[{}/{}] Reviewing {}", i + 1, skills.len(), skill.name);

            let report = match self.controller.review_skill(&skill.name, &skill.path).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Skipping {}: {}", skill.name, e);
                    summary.failed += 1;
                    continue;
                }
            };
            summary.reviewed += 1;

            if report.is_empty() {
                warn!("Session for {} went idle without a report", skill.name);
            }
            println!("{}", render_report_block(&skill.name, &report));

            if let PublishOutcome::Filed(_) = self.publisher.publish(&skill.name, &report, dry_run).await {
                summary.filed += 1;
            }
        }

        info!(
            "Run complete: {} reviewed, {} failed, {} issue(s) filed",
            summary.reviewed, summary.failed, summary.filed
        );
        Ok(summary)
    }
}
