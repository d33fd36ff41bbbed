//! Skill discovery
//!
//! Every visible subdirectory of the skills root is a candidate skill.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Discovery errors (fatal for a run)
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Skills directory not found: {0}")]
    NotFound(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to read skills directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A reviewable skill package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    /// Directory basename
    pub name: String,
    /// Directory location
    pub path: PathBuf,
}

/// List skill directories under `root`, in listing order.
///
/// Entries starting with `.` and plain files are skipped.
pub async fn discover_skills(root: &Path) -> Result<Vec<Skill>, DiscoveryError> {
    let io_err = |source: io::Error| match source.kind() {
        io::ErrorKind::NotFound => DiscoveryError::NotFound(root.to_path_buf()),
        _ => DiscoveryError::Io {
            path: root.to_path_buf(),
            source,
        },
    };

    let meta = tokio::fs::metadata(root).await.map_err(io_err)?;
    if !meta.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(root).await.map_err(io_err)?;
    let mut skills = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let is_dir = tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        debug!("Found skill: {} at {:?}", name, path);
        skills.push(Skill { name, path });
    }

    Ok(skills)
}
