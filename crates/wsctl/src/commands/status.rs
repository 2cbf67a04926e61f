use anyhow::Result;
use wsctl_core::identity::WorkspaceIdentity;
use wsctl_core::state::StateStore;

use crate::commands::context::docker;

pub async fn run(workspace: &str) -> Result<()> {
    let store = StateStore::default_path();
    let record = match store.get_workspace_state(workspace)? {
        Some(r) => r,
        None => {
            println!("workspace: {workspace}");
            println!("  state:     unknown (no recorded state)");
            return Ok(());
        }
    };
    let identity = WorkspaceIdentity::new(std::path::Path::new(&record.config_dir), Some(workspace));
    let docker = docker();
    let inspect = docker.inspect_container(&identity.container_name).await?;

    println!("workspace:   {workspace}");
    println!("container:   {}", identity.container_name);
    println!("ssh port:    {}", record.ssh_port);
    println!("forwards:    {:?}", record.forwards);
    println!("selected key:{}", record.selected_key.as_deref().unwrap_or("(none)"));
    match inspect {
        Some(i) if i.state.running => println!("status:      running (image {})", i.config.image),
        Some(i) => println!("status:      stopped ({})", i.state.status),
        None => println!("status:      no container"),
    }
    Ok(())
}
