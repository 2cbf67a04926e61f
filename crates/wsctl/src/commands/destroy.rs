use anyhow::Result;
use std::io::Write;
use wsctl_core::identity::WorkspaceIdentity;
use wsctl_core::state::StateStore;

use crate::commands::context::docker;

pub async fn run(workspaces: &[String], keep_volumes: bool, force: bool) -> Result<()> {
    for workspace in workspaces {
        destroy_one(workspace, keep_volumes, force).await?;
    }
    Ok(())
}

async fn destroy_one(workspace: &str, keep_volumes: bool, force: bool) -> Result<()> {
    let store = StateStore::default_path();
    let record = store.get_workspace_state(workspace)?;
    let config_dir = match &record {
        Some(r) => r.config_dir.clone(),
        None => {
            println!("workspace '{workspace}' has no recorded state; nothing to destroy");
            return Ok(());
        }
    };

    if !force && !confirm(workspace)? {
        println!("skipping '{workspace}'");
        return Ok(());
    }

    let identity = WorkspaceIdentity::new(std::path::Path::new(&config_dir), Some(workspace));
    let docker = docker();
    docker.remove_container(&identity.container_name, true).await?;
    if !keep_volumes {
        for suffix in ["home", "docker", "cache"] {
            docker.remove_volume(&format!("{}-{suffix}", identity.container_name)).await?;
        }
    }
    store.remove_workspace_state(workspace)?;
    println!("workspace '{workspace}' destroyed");
    Ok(())
}

fn confirm(workspace: &str) -> Result<bool> {
    print!("destroy workspace '{workspace}' and its container? [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
