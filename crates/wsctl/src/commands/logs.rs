use anyhow::{bail, Result};
use wsctl_core::identity::WorkspaceIdentity;
use wsctl_core::state::StateStore;

use crate::commands::context::docker;

pub async fn run(workspace: &str, tail: u32, follow: bool) -> Result<()> {
    let store = StateStore::default_path();
    let record = store
        .get_workspace_state(workspace)?
        .ok_or_else(|| anyhow::anyhow!("no recorded state for workspace '{workspace}'"))?;
    let identity = WorkspaceIdentity::new(std::path::Path::new(&record.config_dir), Some(workspace));
    let docker = docker();
    if !docker.container_exists(&identity.container_name).await? {
        bail!("workspace '{workspace}' has no container");
    }
    docker.logs(&identity.container_name, tail, follow).await?;
    Ok(())
}
