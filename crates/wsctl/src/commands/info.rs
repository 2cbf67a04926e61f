use anyhow::Result;

use crate::commands::context::resolve_by_name;

pub async fn run(workspace: &str) -> Result<()> {
    let resolved = resolve_by_name(workspace)?;
    println!("name:        {}", resolved.name);
    println!("config dir:  {}", resolved.config_dir.display());
    match &resolved.repo {
        Some(repo) => println!("repo:        {} @ {}", repo.remote.as_deref().unwrap_or("(none)"), repo.branch),
        None => println!("repo:        (none)"),
    }
    println!("forwards:    {:?}", resolved.forwards);
    for mount in &resolved.mounts {
        println!("mount:       {} -> {} ({})", mount.source, mount.target, mount.mode);
    }
    for script in &resolved.bootstrap_scripts {
        println!("bootstrap:   {} ({:?})", script.path, script.source);
    }
    println!("runtime cfg: {}", resolved.state.runtime_config_path.display());
    Ok(())
}
