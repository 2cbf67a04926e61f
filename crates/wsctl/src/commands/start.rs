use anyhow::{bail, Context, Result};
use std::time::Duration;
use wsctl_core::{
    buildkit, identity::WorkspaceIdentity, paths, runtime::RuntimeFile, sshkey, state::StateStore,
};

use crate::commands::context::{docker, resolve};
use crate::ui::spinner::PlainSpinner;

pub struct StartArgs {
    pub workspace: String,
    pub rebuild: bool,
    pub no_cache: bool,
    pub force_recreate: bool,
    pub no_init: bool,
    pub verbose: bool,
    pub path: Option<String>,
}

pub async fn run(args: StartArgs) -> Result<()> {
    let resolved = resolve(args.path.as_deref()).await?;
    if resolved.name != args.workspace {
        bail!(
            "resolved config directory belongs to workspace '{}', not '{}'",
            resolved.name,
            args.workspace
        );
    }
    let identity = WorkspaceIdentity::new(&resolved.config_dir, Some(&resolved.name));
    let docker = docker();
    docker.check_installed().await?;

    if docker.container_exists(&identity.container_name).await? && !args.force_recreate && !args.rebuild && !args.no_cache {
        let inspect = docker.inspect_container(&identity.container_name).await?;
        if let Some(inspect) = inspect {
            if inspect.state.running {
                println!("workspace '{}' is already running", args.workspace);
                return Ok(());
            }
            return resume_stopped(&args, &resolved, &identity, &docker).await;
        }
    }

    create_fresh(&args, &resolved, &identity, &docker).await
}

async fn resume_stopped(
    args: &StartArgs,
    resolved: &wsctl_core::config::ResolvedWorkspaceConfig,
    identity: &WorkspaceIdentity,
    docker: &wsctl_core::docker::CliDocker,
) -> Result<()> {
    docker.start_container(&identity.container_name).await?;
    wait_for_dockerd_ready(docker, &identity.container_name).await?;
    buildkit::ensure_shared_buildkit(docker).await?;
    docker.connect_to_network(&identity.container_name, buildkit::NETWORK).await?;
    buildkit::configure_buildx_in_container(docker, &identity.container_name).await?;
    if !args.no_init {
        run_agent_init(docker, &identity.container_name).await?;
    }
    if let Some(repo) = &resolved.repo {
        if repo.remote.is_some() {
            verify_clone_marker(docker, &identity.container_name).await?;
        }
    }
    println!("workspace '{}' resumed", args.workspace);
    Ok(())
}

async fn create_fresh(
    args: &StartArgs,
    resolved: &wsctl_core::config::ResolvedWorkspaceConfig,
    identity: &WorkspaceIdentity,
    docker: &wsctl_core::docker::CliDocker,
) -> Result<()> {
    let store = StateStore::default_path();
    let record = store
        .ensure_workspace_state(&resolved.name, &resolved.config_dir.display().to_string(), &resolved.forwards)
        .await?;

    let repo_url = resolved.repo.as_ref().and_then(|r| r.remote.clone()).unwrap_or_default();
    let ssh_config = wsctl_core::config::load_user_config(&paths::user_config_path())?.ssh;
    let selected_key = sshkey::select_key(&repo_url, &ssh_config).await;
    store.set_selected_key(&resolved.name, selected_key.clone())?;

    ensure_ssh_host_keypair(&resolved.state.key_path)?;

    let runtime = RuntimeFile::from_resolved(resolved, record.ssh_port, selected_key.clone());
    runtime.write(&resolved.state.runtime_config_path)?;

    if args.force_recreate && docker.container_exists(&identity.container_name).await? {
        docker.remove_container(&identity.container_name, true).await?;
    }

    ensure_shared_image_fresh(docker, args.no_cache || args.rebuild).await?;
    buildkit::ensure_shared_buildkit(docker).await?;
    wsctl_core::fsutil::ensure_dir(&paths::logs_dir())?;

    let run_args = assemble_run_args(resolved, identity, &record, selected_key.as_deref(), &repo_url);
    let spinner = PlainSpinner::start("Starting container...");
    docker.create_container(&run_args).await?;
    spinner.finish_with_message("Container created");

    docker.connect_to_network(&identity.container_name, buildkit::NETWORK).await?;
    wait_for_exec_ready(docker, &identity.container_name).await?;
    wait_for_dockerd_ready(docker, &identity.container_name).await?;
    buildkit::configure_buildx_in_container(docker, &identity.container_name).await?;

    if !args.no_init {
        run_agent_init(docker, &identity.container_name).await?;
    }
    if resolved.repo.as_ref().and_then(|r| r.remote.as_ref()).is_some() {
        verify_clone_marker(docker, &identity.container_name).await?;
    }

    println!("workspace '{}' started on ssh port {}", resolved.name, record.ssh_port);
    for port in &resolved.forwards {
        println!("forward {port} -> {port}");
    }
    let _ = args.verbose;
    Ok(())
}

fn ensure_ssh_host_keypair(key_path: &std::path::Path) -> Result<()> {
    if key_path.exists() {
        return Ok(());
    }
    wsctl_core::fsutil::ensure_dir(key_path.parent().unwrap())?;
    let status = std::process::Command::new("ssh-keygen")
        .args(["-t", "ed25519", "-N", "", "-f"])
        .arg(key_path)
        .status()
        .context("running ssh-keygen")?;
    if !status.success() {
        bail!("ssh-keygen failed to create {}", key_path.display());
    }
    Ok(())
}

async fn ensure_shared_image_fresh(docker: &wsctl_core::docker::CliDocker, force: bool) -> Result<()> {
    let store = StateStore::default_path();
    let stale = match store.get_last_shared_image_build()? {
        Some(ts) => chrono::Utc::now().signed_duration_since(ts) > chrono::Duration::days(7),
        None => true,
    };
    let exists = docker.image_exists(wsctl_core::identity::SHARED_IMAGE_TAG).await?;
    if force || stale || !exists {
        crate::commands::build::run(force).await?;
    }
    Ok(())
}

fn assemble_run_args(
    resolved: &wsctl_core::config::ResolvedWorkspaceConfig,
    identity: &WorkspaceIdentity,
    record: &wsctl_core::state::WorkspaceStateRecord,
    selected_key: Option<&str>,
    repo_url: &str,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "--detach".into(),
        "--privileged".into(),
        "--name".into(),
        identity.container_name.clone(),
        "--hostname".into(),
        identity.container_name.clone(),
        "-p".into(),
        format!("{}:22", record.ssh_port),
    ];

    let mut env: Vec<(String, String)> = vec![
        ("USER".into(), "workspace".into()),
        ("WORKSPACE_NAME".into(), resolved.name.clone()),
        ("HOST_UID".into(), current_uid()),
        ("HOST_GID".into(), current_gid()),
        ("WORKSPACE_RUNTIME_CONFIG".into(), "/workspace/config/runtime.json".into()),
        ("WORKSPACE_SOURCE_DIR".into(), "/workspace/source".into()),
        ("HOST_HOME".into(), "/host/home".into()),
        ("WORKSPACE_ASSIGNED_SSH_PORT".into(), record.ssh_port.to_string()),
        ("DOCKER_BUILDKIT".into(), "1".into()),
        ("COMPOSE_DOCKER_CLI_BUILD".into(), "1".into()),
    ];
    if let Ok(pubkey) = std::fs::read_to_string(resolved.state.key_path.with_extension("pub")) {
        env.push(("SSH_PUBLIC_KEY".into(), pubkey.trim().to_string()));
    }
    if !repo_url.is_empty() {
        env.push(("WORKSPACE_REPO_URL".into(), repo_url.to_string()));
        if let Some(repo) = &resolved.repo {
            env.push(("WORKSPACE_REPO_BRANCH".into(), repo.branch.clone()));
        }
    }
    if let Some(key) = selected_key {
        env.push(("WORKSPACE_SELECTED_SSH_KEY".into(), key.to_string()));
    }
    if let Ok(sock) = std::env::var("SSH_AUTH_SOCK") {
        if std::path::Path::new(&sock).exists() {
            env.push(("SSH_AUTH_SOCK".into(), "/ssh-agent".into()));
            args.push("-v".into());
            args.push(format!("{sock}:/ssh-agent"));
        }
    }
    for (key, value) in env {
        args.push("-e".into());
        args.push(format!("{key}={value}"));
    }

    args.push("-v".into());
    args.push(format!("{}:/workspace/config/runtime.json:ro", resolved.state.runtime_config_path.display()));
    args.push("-v".into());
    args.push(format!("{}:/workspace/source:ro", resolved.config_dir.display()));
    let userconfig = wsctl_core::paths::workspaces_root();
    if userconfig.exists() {
        args.push("-v".into());
        args.push(format!("{}:/workspace/userconfig:ro", userconfig.display()));
    }
    args.push("-v".into());
    args.push(format!("{}:/host/home:ro", wsctl_core::paths::host_home().display()));
    args.push("-v".into());
    args.push(format!("{}:/workspace/logs:rw", wsctl_core::paths::logs_dir().display()));
    for mount in &resolved.mounts {
        args.push("-v".into());
        args.push(format!("{}:{}:{}", mount.source, mount.target, mount.mode));
    }

    for suffix in ["home:/home/workspace", "docker:/var/lib/docker", "cache:/home/workspace/.cache"] {
        let (name_suffix, target) = suffix.split_once(':').unwrap();
        args.push("-v".into());
        args.push(format!("{}-{}:{}", identity.container_name, name_suffix, target));
    }

    args.push(identity.image_tag.clone());
    args
}

fn current_uid() -> String {
    id_output("-u")
}

fn current_gid() -> String {
    id_output("-g")
}

fn id_output(flag: &str) -> String {
    std::process::Command::new("id")
        .arg(flag)
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .unwrap_or_else(|| "0".to_string())
}

async fn wait_for_exec_ready(docker: &wsctl_core::docker::CliDocker, container: &str) -> Result<()> {
    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    loop {
        if docker.exec_captured(container, &["true"], None).await.map(|o| o.success()).unwrap_or(false) {
            return Ok(());
        }
        if std::time::Instant::now() > deadline {
            bail!("container {container} did not become execable within 15s");
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}

async fn wait_for_dockerd_ready(docker: &wsctl_core::docker::CliDocker, container: &str) -> Result<()> {
    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    loop {
        let ready = docker
            .exec_captured(container, &["docker", "info"], None)
            .await
            .map(|o| o.success())
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        if std::time::Instant::now() > deadline {
            bail!("dockerd inside {container} did not become ready within 30s");
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn run_agent_init(docker: &wsctl_core::docker::CliDocker, container: &str) -> Result<()> {
    let out = docker
        .exec_captured(container, &["/usr/local/bin/workspace-internal", "init"], None)
        .await?;
    if !out.success() {
        bail!("in-container init failed: {}", out.stderr);
    }
    Ok(())
}

async fn verify_clone_marker(docker: &wsctl_core::docker::CliDocker, container: &str) -> Result<()> {
    let out = docker
        .exec_captured(container, &["test", "-d", "/workspace/source/.git"], None)
        .await?;
    if !out.success() {
        bail!("expected /workspace/source/.git to exist after init but it does not");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_uid_gid_are_numeric() {
        assert!(current_uid().parse::<u32>().is_ok());
        assert!(current_gid().parse::<u32>().is_ok());
    }
}
