use anyhow::Result;
use wsctl_core::state::StateStore;

pub fn run(_path: Option<String>) -> Result<()> {
    let store = StateStore::default_path();
    let mut names = store.list_workspace_names()?;
    names.sort();
    if names.is_empty() {
        println!("no workspaces known");
        return Ok(());
    }
    for name in names {
        if let Some(record) = store.get_workspace_state(&name)? {
            println!("{name}\tport {}\tforwards {:?}\t{}", record.ssh_port, record.forwards, record.config_dir);
        }
    }
    Ok(())
}
