//! In-container init: clone the project repository, install an editor
//! config, install dev tools, and run bootstrap scripts. Idempotent once
//! the marker file exists.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use wsctl_core::config::ScriptSource;
use wsctl_core::process::run_captured;
use wsctl_core::runtime::RuntimeFile;

const WORKSPACE_HOME: &str = "/home/workspace";
const RUNTIME_CONFIG_PATH: &str = "/workspace/config/runtime.json";
const MARKER_FILE: &str = ".workspace-initialized";

pub async fn run() -> Result<()> {
    if Path::new(WORKSPACE_HOME).join(MARKER_FILE).exists() {
        info!("already initialized, skipping");
        return Ok(());
    }

    if Path::new("/ssh-agent").exists() {
        std::env::set_var("SSH_AUTH_SOCK", "/ssh-agent");
    }

    copy_host_gitconfig();

    let runtime = RuntimeFile::load(Path::new(RUNTIME_CONFIG_PATH))
        .context("reading mounted runtime.json")?;

    if let Some(repo) = &runtime.workspace.repo {
        if let Some(remote) = &repo.remote {
            clone_repository(remote, &repo.branch, &repo.clone_args, runtime.ssh.selected_key.as_deref()).await?;
        }
    }

    append_shell_exports(".bashrc")?;
    append_shell_exports(".zshrc")?;

    install_lazyvim().await;
    install_dev_tools().await;

    run_bootstrap_scripts(&runtime).await?;

    std::fs::write(Path::new(WORKSPACE_HOME).join(MARKER_FILE), "")?;
    info!("initialization complete");
    Ok(())
}

fn copy_host_gitconfig() {
    let host_gitconfig = PathBuf::from("/host/home/.gitconfig");
    if !host_gitconfig.is_file() {
        return;
    }
    let dest = PathBuf::from(WORKSPACE_HOME).join(".gitconfig");
    if let Err(e) = std::fs::copy(&host_gitconfig, &dest) {
        warn!(error = %e, "failed to copy host .gitconfig, continuing");
    }
}

async fn clone_repository(remote: &str, branch: &str, clone_args: &[String], selected_key: Option<&str>) -> Result<()> {
    let source_dir = PathBuf::from("/workspace/source");
    if source_dir.join(".git").is_dir() {
        return Ok(());
    }

    let mut env = HashMap::new();
    if let Some(key) = selected_key {
        let ssh_key_path = Path::new(WORKSPACE_HOME).join(".ssh").join(key);
        if ssh_key_path.is_file() {
            env.insert(
                "GIT_SSH_COMMAND".to_string(),
                format!("ssh -i {} -F {}/.ssh/config", ssh_key_path.display(), WORKSPACE_HOME),
            );
        }
    }

    if let Some(host) = remote_host(remote) {
        ensure_known_host(&host).await;
    }

    let mut args: Vec<String> = clone_args.to_vec();
    let sets_branch = args.iter().any(|a| a == "--branch" || a == "-b");
    args.push(remote.to_string());
    args.push(source_dir.display().to_string());

    if !sets_branch {
        let mut with_branch = clone_args.to_vec();
        with_branch.push("--branch".to_string());
        with_branch.push(branch.to_string());
        with_branch.push(remote.to_string());
        with_branch.push(source_dir.display().to_string());
        let mut full_args = vec!["clone".to_string()];
        full_args.extend(with_branch);
        if run_captured("git", &full_args, &env, true).await?.success() {
            write_core_ssh_command(&source_dir, &env);
            return Ok(());
        }
        warn!(branch, "git clone with --branch failed, retrying without it");
    }

    let mut full_args = vec!["clone".to_string()];
    full_args.extend(args);
    let out = run_captured("git", &full_args, &env, true).await?;
    if !out.success() {
        bail!("git clone of {remote} failed: {}", out.stderr);
    }
    write_core_ssh_command(&source_dir, &env);
    Ok(())
}

fn write_core_ssh_command(source_dir: &Path, env: &HashMap<String, String>) {
    if !source_dir.join(".git").is_dir() {
        return;
    }
    if let Some(cmd) = env.get("GIT_SSH_COMMAND") {
        let _ = std::process::Command::new("git")
            .current_dir(source_dir)
            .args(["config", "core.sshCommand", cmd])
            .status();
    }
}

fn remote_host(remote: &str) -> Option<String> {
    if let Some(rest) = remote.strip_prefix("git@") {
        return rest.split(':').next().map(str::to_string);
    }
    if let Some(rest) = remote.strip_prefix("ssh://") {
        return rest.split('/').next().map(|h| h.split('@').last().unwrap_or(h).to_string());
    }
    None
}

async fn ensure_known_host(host: &str) {
    let known_hosts = Path::new(WORKSPACE_HOME).join(".ssh").join("known_hosts");
    let already_known = std::fs::read_to_string(&known_hosts)
        .map(|c| c.contains(host))
        .unwrap_or(false);
    if already_known {
        return;
    }
    if let Ok(out) = run_captured("ssh-keyscan", &[host], &HashMap::new(), true).await {
        if out.success() {
            use std::io::Write;
            if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&known_hosts) {
                let _ = f.write_all(out.stdout.as_bytes());
            }
        }
    }
}

fn append_shell_exports(rc_name: &str) -> Result<()> {
    let path = Path::new(WORKSPACE_HOME).join(rc_name);
    let mut contents = std::fs::read_to_string(&path).unwrap_or_default();
    let exports = [
        r#"export GIT_SSH_COMMAND="ssh -F ~/.ssh/config""#,
        r#"export PATH="$HOME/.npm-global/bin:$PATH""#,
    ];
    let mut changed = false;
    for line in exports {
        if !contents.contains(line) {
            if !contents.is_empty() && !contents.ends_with('\n') {
                contents.push('\n');
            }
            contents.push_str(line);
            contents.push('\n');
            changed = true;
        }
    }
    if changed {
        std::fs::write(&path, contents)?;
    }
    Ok(())
}

async fn install_lazyvim() {
    let nvim_dir = Path::new(WORKSPACE_HOME).join(".config/nvim");
    if nvim_dir.join("init.lua").exists() || nvim_dir.join("init.vim").exists() {
        return;
    }

    let host_nvim = Path::new("/host/home/.config/nvim");
    let copied = host_nvim.is_dir()
        && run_captured(
            "sudo",
            &["cp", "-r", host_nvim.to_str().unwrap_or_default(), nvim_dir.to_str().unwrap_or_default()],
            &HashMap::new(),
            true,
        )
        .await
        .map(|o| o.success())
        .unwrap_or(false);

    if !copied {
        let cloned = run_captured(
            "git",
            &["clone", "https://github.com/LazyVim/starter", nvim_dir.to_str().unwrap_or_default()],
            &HashMap::new(),
            true,
        )
        .await
        .map(|o| o.success())
        .unwrap_or(false);
        if cloned {
            let _ = std::fs::remove_dir_all(nvim_dir.join(".git"));
        } else {
            warn!("failed to install LazyVim from host copy or upstream clone");
            return;
        }
    }

    run_captured(
        "chown",
        &["-R", "workspace:workspace", nvim_dir.to_str().unwrap_or_default()],
        &HashMap::new(),
        true,
    )
    .await
    .ok();
}

async fn install_dev_tools() {
    if !on_path("codex").await {
        run_captured("npm", &["install", "-g", "codex"], &HashMap::new(), true).await.ok();
    }
    if !on_path("opencode").await {
        install_opencode().await;
    }
}

async fn on_path(name: &str) -> bool {
    run_captured("which", &[name], &HashMap::new(), true)
        .await
        .map(|out| out.success())
        .unwrap_or(false)
}

async fn install_opencode() {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => {
            warn!(arch = other, "unsupported architecture for opencode install, skipping");
            return;
        }
    };
    let url = format!("https://github.com/sst/opencode/releases/latest/download/opencode-linux-{arch}.zip");
    let zip_path = "/tmp/opencode.zip";
    let downloaded = run_captured("curl", &["-fsSL", "-o", zip_path, &url], &HashMap::new(), true)
        .await
        .map(|o| o.success())
        .unwrap_or(false);
    if !downloaded {
        warn!("failed to download opencode release, skipping");
        return;
    }
    run_captured("unzip", &["-o", zip_path, "-d", "/usr/local/bin"], &HashMap::new(), true).await.ok();
}

async fn run_bootstrap_scripts(runtime: &RuntimeFile) -> Result<()> {
    for entry in &runtime.bootstrap.scripts {
        let base = match entry.source {
            ScriptSource::Project => Path::new("/workspace/source"),
            ScriptSource::User => Path::new("/workspace/userconfig"),
        };
        let target = base.join(&entry.path);
        for script in expand_bootstrap_target(&target)? {
            run_one_bootstrap_script(&script).await?;
        }
    }
    Ok(())
}

fn expand_bootstrap_target(target: &Path) -> Result<Vec<PathBuf>> {
    if target.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(target)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_executable(p))
            .collect();
        files.sort();
        return Ok(files);
    }
    if !target.is_file() {
        bail!("bootstrap script {} does not exist", target.display());
    }
    if !is_executable(target) {
        bail!("bootstrap script {} is not executable", target.display());
    }
    Ok(vec![target.to_path_buf()])
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

async fn run_one_bootstrap_script(script: &Path) -> Result<()> {
    info!(script = %script.display(), "running bootstrap script");
    let status = tokio::process::Command::new(script)
        .current_dir(WORKSPACE_HOME)
        .status()
        .await
        .with_context(|| format!("spawning bootstrap script {}", script.display()))?;
    if !status.success() {
        bail!("bootstrap script {} exited with {:?}", script.display(), status.code());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn remote_host_parses_scp_like_syntax() {
        assert_eq!(remote_host("git@github.com:org/repo.git"), Some("github.com".to_string()));
    }

    #[test]
    fn remote_host_parses_ssh_url() {
        assert_eq!(remote_host("ssh://git@gitlab.example.com/org/repo.git"), Some("gitlab.example.com".to_string()));
    }

    #[test]
    fn remote_host_returns_none_for_https() {
        assert_eq!(remote_host("https://github.com/org/repo.git"), None);
    }

    #[test]
    fn expand_bootstrap_target_errors_on_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.sh");
        assert!(expand_bootstrap_target(&missing).is_err());
    }

    #[test]
    fn expand_bootstrap_target_expands_directory_to_sorted_executables() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["b.sh", "a.sh"] {
            let path = dir.path().join(name);
            std::fs::write(&path, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let expanded = expand_bootstrap_target(dir.path()).unwrap();
        let names: Vec<_> = expanded.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.sh", "b.sh"]);
    }

    #[test]
    fn expand_bootstrap_target_rejects_non_executable_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("setup.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        assert!(expand_bootstrap_target(&path).is_err());
    }
}
