//! SSH key installation inside the container.
//!
//! Builds `~/.ssh` for the `workspace` user from whatever the host mounted
//! in at `/host/home/.ssh`, plus the public key generated on the host for
//! this workspace.

use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use wsctl_core::process::run_captured;

const WORKSPACE_HOME: &str = "/home/workspace";
const HOST_SSH_DIR: &str = "/host/home/.ssh";

fn workspace_ssh_dir() -> PathBuf {
    PathBuf::from(WORKSPACE_HOME).join(".ssh")
}

pub async fn install() -> Result<()> {
    let ssh_dir = workspace_ssh_dir();
    fs::create_dir_all(&ssh_dir)?;
    fs::set_permissions(&ssh_dir, fs::Permissions::from_mode(0o700))?;

    copy_host_keys(&ssh_dir);
    ensure_authorized_keys(&ssh_dir)?;
    if let Ok(selected) = std::env::var("WORKSPACE_SELECTED_SSH_KEY") {
        if ssh_dir.join(&selected).is_file() {
            append_client_config(&ssh_dir, &selected)?;
        }
    }
    set_modes(&ssh_dir)?;

    run_captured(
        "chown",
        &["-R", "workspace:workspace", ssh_dir.to_str().unwrap_or_default()],
        &HashMap::new(),
        true,
    )
    .await
    .ok();
    Ok(())
}

fn copy_host_keys(ssh_dir: &Path) {
    let host_dir = Path::new(HOST_SSH_DIR);
    if !host_dir.is_dir() {
        return;
    }
    let Ok(entries) = fs::read_dir(host_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else { continue };
        if let Err(e) = fs::copy(&path, ssh_dir.join(name)) {
            warn!(path = %path.display(), error = %e, "failed to copy host ssh key, continuing");
        }
    }
}

fn ensure_authorized_keys(ssh_dir: &Path) -> Result<()> {
    let path = ssh_dir.join("authorized_keys");
    let mut lines: Vec<String> = if path.is_file() {
        fs::read_to_string(&path)?.lines().map(str::to_string).collect()
    } else {
        Vec::new()
    };

    if let Ok(pubkey) = std::env::var("SSH_PUBLIC_KEY") {
        let pubkey = pubkey.trim().to_string();
        if !pubkey.is_empty() && !lines.iter().any(|l| l.trim() == pubkey) {
            lines.push(pubkey);
        }
    }

    lines.sort();
    lines.dedup();
    fs::write(&path, format!("{}\n", lines.join("\n")))?;
    info!(count = lines.len(), "authorized_keys written");
    Ok(())
}

fn append_client_config(ssh_dir: &Path, selected_key: &str) -> Result<()> {
    let path = ssh_dir.join("config");
    let existing = fs::read_to_string(&path).unwrap_or_default();
    let block = format!(
        "Host *\n  IdentityFile ~/.ssh/{selected_key}\n  IdentitiesOnly yes\n  AddKeysToAgent yes\n"
    );
    if existing.contains(&format!("IdentityFile ~/.ssh/{selected_key}")) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&block);
    fs::write(&path, updated)?;
    Ok(())
}

fn set_modes(ssh_dir: &Path) -> Result<()> {
    let Ok(entries) = fs::read_dir(ssh_dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let mode = if name == "authorized_keys" || (!name.ends_with(".pub") && name != "known_hosts" && name != "config") {
            0o600
        } else {
            0o644
        };
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}
