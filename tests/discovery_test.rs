//! Skill Discovery Integration Tests

use skill_reviewer::discovery::{discover_skills, DiscoveryError};
use std::fs;
use tempfile::TempDir;

fn create_skills_root(dirs: &[&str], files: &[&str]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    for dir in dirs {
        fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
    }
    for file in files {
        fs::write(temp_dir.path().join(file), "x").unwrap();
    }
    temp_dir
}

#[tokio::test]
async fn test_hidden_directories_excluded() {
    let root = create_skills_root(&[".git", "alpha", "beta"], &[]);

    let skills = discover_skills(root.path()).await.unwrap();
    let mut names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
    names.sort();

    assert_eq!(names, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_plain_files_skipped() {
    let root = create_skills_root(&["anki-connect"], &["README.md", ".DS_Store"]);

    let skills = discover_skills(root.path()).await.unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0].name, "anki-connect");
    assert_eq!(skills[0].path, root.path().join("anki-connect"));
}

#[tokio::test]
async fn test_empty_root() {
    let root = create_skills_root(&[], &[]);
    assert!(discover_skills(root.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_root() {
    let root = create_skills_root(&[], &[]);
    let missing = root.path().join("does-not-exist");

    let err = discover_skills(&missing).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NotFound(p) if p == missing));
}

#[tokio::test]
async fn test_root_is_file() {
    let root = create_skills_root(&[], &["skills"]);
    let err = discover_skills(&root.path().join("skills")).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NotADirectory(_)));
}
