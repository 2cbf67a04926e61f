//! Shared config-resolution path used by every command that operates on a
//! single workspace.

use anyhow::{Context, Result};
use std::path::PathBuf;
use wsctl_core::config::{self, ResolvedWorkspaceConfig};
use wsctl_core::identity::WorkspaceIdentity;
use wsctl_core::{docker::CliDocker, paths, workspace};

/// The build directory packaged alongside the tool for the shared image.
/// Out of scope for this port: the Dockerfile's own contents belong to
/// packaging, not the orchestrator's algorithm.
pub fn shared_image_build_context() -> PathBuf {
    paths::workspaces_root().join("image")
}

pub async fn resolve(path_override: Option<&str>) -> Result<ResolvedWorkspaceConfig> {
    let cwd = match path_override {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().context("reading current directory")?,
    };
    let repo_root = workspace::discover_repo_root(&cwd).await;
    let config_dir = config::find_workspace_dir(&cwd, Some(&repo_root))
        .with_context(|| format!("looking for {} starting from {}", paths::project_config_file_name(), cwd.display()))?;

    let project = config::load_project_config(&config_dir.join(paths::project_config_file_name()))?;
    config::ensure_user_config()?;
    let user = config::load_user_config(&paths::user_config_path())?;
    let identity = WorkspaceIdentity::new(&config_dir, None);

    Ok(config::resolve_config(
        &project,
        &user,
        &config_dir,
        &identity,
        shared_image_build_context(),
    )?)
}

pub fn docker() -> CliDocker {
    CliDocker::new()
}

/// Resolve a workspace's config from its recorded state entry rather than
/// the current directory, for commands that take a workspace name and may
/// run from anywhere on the host.
pub fn resolve_by_name(name: &str) -> Result<ResolvedWorkspaceConfig> {
    use wsctl_core::state::StateStore;

    let store = StateStore::default_path();
    let record = store
        .get_workspace_state(name)?
        .with_context(|| format!("no recorded state for workspace '{name}'"))?;
    let config_dir = PathBuf::from(&record.config_dir);
    let project = config::load_project_config(&config_dir.join(paths::project_config_file_name()))?;
    let user = config::load_user_config(&paths::user_config_path())?;
    let identity = WorkspaceIdentity::new(&config_dir, Some(name));
    Ok(config::resolve_config(
        &project,
        &user,
        &config_dir,
        &identity,
        shared_image_build_context(),
    )?)
}
