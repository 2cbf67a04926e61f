use anyhow::Result;
use wsctl_core::identity::WorkspaceIdentity;
use wsctl_core::state::StateStore;

use crate::commands::context::docker;

pub async fn run(workspace: &str) -> Result<()> {
    let store = StateStore::default_path();
    let record = store.get_workspace_state(workspace)?;
    let config_dir = match record {
        Some(r) => r.config_dir,
        None => {
            println!("workspace '{workspace}' has no recorded state; nothing to stop");
            return Ok(());
        }
    };
    let identity = WorkspaceIdentity::new(std::path::Path::new(&config_dir), Some(workspace));
    let docker = docker();
    if !docker.container_exists(&identity.container_name).await? {
        println!("workspace '{workspace}' has no container; nothing to stop");
        return Ok(());
    }
    docker.stop_container(&identity.container_name).await?;
    println!("workspace '{workspace}' stopped");
    Ok(())
}
