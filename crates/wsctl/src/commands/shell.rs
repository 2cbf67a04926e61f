use anyhow::{bail, Result};
use std::collections::HashMap;
use wsctl_core::identity::WorkspaceIdentity;
use wsctl_core::state::StateStore;

use crate::commands::context::docker;

pub async fn run(workspace: &str, user: Option<String>, root: bool, command: Option<String>) -> Result<()> {
    let store = StateStore::default_path();
    let record = store
        .get_workspace_state(workspace)?
        .ok_or_else(|| anyhow::anyhow!("no recorded state for workspace '{workspace}'"))?;
    let identity = WorkspaceIdentity::new(std::path::Path::new(&record.config_dir), Some(workspace));
    let docker = docker();
    let inspect = docker.inspect_container(&identity.container_name).await?;
    match inspect {
        Some(i) if i.state.running => {}
        _ => bail!("workspace '{workspace}' is not running; start it first"),
    }

    let exec_user = if root {
        Some("root".to_string())
    } else {
        user.or_else(|| Some("workspace".to_string()))
    };

    let login_shell = detect_login_shell(&docker, &identity.container_name, exec_user.as_deref()).await;
    let argv: Vec<&str> = match &command {
        Some(c) => vec![login_shell.as_str(), "-lc", c.as_str()],
        None => vec![login_shell.as_str(), "-l"],
    };

    let mut env = HashMap::new();
    if let Ok(term) = std::env::var("TERM") {
        env.insert("TERM".to_string(), term);
    }

    let status = docker
        .exec_streaming(&identity.container_name, &argv, exec_user.as_deref(), true, &env)
        .await?;
    if let Some(code) = status {
        if code != 0 {
            std::process::exit(code);
        }
    }
    Ok(())
}

/// Look up the exec user's login shell via `getent passwd`, falling back
/// to `/bin/bash` when the lookup fails or the entry has no shell field.
async fn detect_login_shell(docker: &wsctl_core::docker::CliDocker, container: &str, exec_user: Option<&str>) -> String {
    let who = exec_user.unwrap_or("workspace");
    let out = match docker.exec_captured(container, &["getent", "passwd", who], None).await {
        Ok(out) if out.success() => out,
        _ => return "/bin/bash".to_string(),
    };
    out.stdout
        .trim()
        .split(':')
        .nth(6)
        .filter(|s| !s.is_empty())
        .unwrap_or("/bin/bash")
        .to_string()
}
