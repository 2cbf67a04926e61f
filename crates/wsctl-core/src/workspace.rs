//! Repository root discovery
//!
//! Used by the config resolver to bound the walk-up search for
//! `.workspace.yml` at the enclosing VCS root rather than the filesystem root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Ask `git` for the repository root containing `cwd`. Falls back to `cwd`
/// itself when `git` is unavailable or `cwd` is not inside a repository.
#[instrument]
pub async fn discover_repo_root(cwd: &Path) -> PathBuf {
    let cwd_str = cwd.display().to_string();
    match run_git_toplevel(cwd).await {
        Some(root) => root,
        None => {
            debug!(cwd = %cwd_str, "not inside a git repository, using cwd as repo root");
            cwd.to_path_buf()
        }
    }
}

async fn run_git_toplevel(cwd: &Path) -> Option<PathBuf> {
    let cwd_str = cwd.display().to_string();
    let args = ["-C", &cwd_str, "rev-parse", "--show-toplevel"];
    let out = crate::process::run_captured("git", &args, &HashMap::new(), true)
        .await
        .ok()?;
    if !out.success() {
        return None;
    }
    let trimmed = out.stdout.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    #[serial]
    async fn falls_back_to_cwd_outside_a_repository() {
        let dir = TempDir::new().unwrap();
        let root = discover_repo_root(dir.path()).await;
        // Either git isn't installed, or the temp dir genuinely isn't a repo;
        // either way we must not hang or panic, and get something sensible back.
        assert!(root == dir.path() || root.starts_with(std::path::Path::new("/")));
    }

    #[tokio::test]
    #[serial]
    async fn finds_root_of_an_initialized_repository() {
        let dir = TempDir::new().unwrap();
        let init = crate::process::run_captured(
            "git",
            &["init", "-q", &dir.path().display().to_string()],
            &HashMap::new(),
            true,
        )
        .await;
        if init.is_err() || !init.unwrap().success() {
            return;
        }
        let nested = dir.path().join("src");
        std::fs::create_dir_all(&nested).unwrap();
        let root = discover_repo_root(&nested).await;
        assert_eq!(
            root.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
