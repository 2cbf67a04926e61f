//! Host-side well-known paths under `<hostHome>/.workspaces`.

use std::path::PathBuf;

pub fn host_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn workspaces_root() -> PathBuf {
    host_home().join(".workspaces")
}

pub fn user_config_path() -> PathBuf {
    workspaces_root().join("config.yml")
}

pub fn userscripts_dir() -> PathBuf {
    workspaces_root().join("userscripts")
}

pub fn state_root() -> PathBuf {
    workspaces_root().join("state")
}

pub fn state_file_path() -> PathBuf {
    state_root().join("state.json")
}

pub fn logs_dir() -> PathBuf {
    workspaces_root().join("logs")
}

pub fn workspace_state_dir(name: &str) -> PathBuf {
    state_root().join(name)
}

pub fn workspace_ssh_dir(name: &str) -> PathBuf {
    workspace_state_dir(name).join("ssh")
}

pub fn workspace_ssh_key_path(name: &str) -> PathBuf {
    workspace_ssh_dir(name).join("id_ed25519")
}

pub fn workspace_runtime_config_path(name: &str) -> PathBuf {
    workspace_state_dir(name).join("runtime.json")
}

pub fn project_config_file_name() -> &'static str {
    ".workspace.yml"
}

/// Host paths mounted into the container read-write when
/// `mountAgentsCredentials` is set, but only when they exist on disk.
pub fn agent_credential_paths() -> Vec<PathBuf> {
    let home = host_home();
    vec![
        home.join(".codex/auth.json"),
        home.join(".local/share/opencode/auth.json"),
        home.join(".claude/.credentials.json"),
    ]
}
