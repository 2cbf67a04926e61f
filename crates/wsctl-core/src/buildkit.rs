//! Shared BuildKit manager
//!
//! One `buildkitd` container, network, and cache volume shared across every
//! workspace on the host. Every operation here is idempotent: calling
//! `ensure_shared_buildkit` twice in a row leaves exactly one of each.

use crate::docker::CliDocker;
use crate::errors::Result;
use std::time::Duration;
use tracing::{info, instrument};

pub const NETWORK: &str = "workspace-internal-buildnet";
pub const VOLUME: &str = "workspace-internal-buildkit-cache";
pub const CONTAINER: &str = "workspace-internal-buildkitd";
pub const PORT: u16 = 1234;

const BUILDER_NAME: &str = "workspace-internal-builder";

#[instrument(skip(docker))]
pub async fn ensure_shared_buildkit(docker: &CliDocker) -> Result<()> {
    docker.create_network(NETWORK).await?;
    docker.create_volume(VOLUME).await?;

    if docker.container_exists(CONTAINER).await? {
        let inspect = docker.inspect_container(CONTAINER).await?;
        if inspect.map(|i| i.state.running).unwrap_or(false) {
            return Ok(());
        }
        docker.start_container(CONTAINER).await?;
        return Ok(());
    }

    let run_args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--privileged".to_string(),
        "--name".to_string(),
        CONTAINER.to_string(),
        "--network".to_string(),
        NETWORK.to_string(),
        "-v".to_string(),
        format!("{VOLUME}:/var/lib/buildkit"),
        "-p".to_string(),
        format!("127.0.0.1:{PORT}:{PORT}"),
        "moby/buildkit:latest".to_string(),
        "--addr".to_string(),
        format!("tcp://0.0.0.0:{PORT}"),
    ];
    docker.create_container(&run_args).await?;
    info!("started shared buildkitd, waiting for its socket");
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(())
}

/// As user `workspace` inside `container`, point its buildx at the shared
/// remote builder and bootstrap it.
#[instrument(skip(docker))]
pub async fn configure_buildx_in_container(docker: &CliDocker, container: &str) -> Result<()> {
    docker
        .exec_captured(container, &["docker", "buildx", "rm", BUILDER_NAME], Some("workspace"))
        .await
        .ok();

    docker
        .exec_captured(
            container,
            &[
                "docker",
                "buildx",
                "create",
                "--name",
                BUILDER_NAME,
                "--driver",
                "remote",
                &format!("tcp://{CONTAINER}:{PORT}"),
                "--use",
            ],
            Some("workspace"),
        )
        .await?;

    docker
        .exec_captured(container, &["docker", "buildx", "inspect", "--bootstrap"], Some("workspace"))
        .await?;
    Ok(())
}

/// `buildkit --status`: presence/state of network, volume, and daemon.
#[derive(Debug, Clone)]
pub struct BuildKitStatus {
    pub network_exists: bool,
    pub volume_exists: bool,
    pub container_running: bool,
}

pub async fn status(docker: &CliDocker) -> Result<BuildKitStatus> {
    let network_exists = docker.network_exists(NETWORK).await?;
    let volume_exists = docker.volume_exists(VOLUME).await?;
    let container_running = docker
        .inspect_container(CONTAINER)
        .await?
        .map(|i| i.state.running)
        .unwrap_or(false);
    Ok(BuildKitStatus {
        network_exists,
        volume_exists,
        container_running,
    })
}

pub async fn stop(docker: &CliDocker) -> Result<()> {
    docker.stop_container(CONTAINER).await
}

pub async fn restart(docker: &CliDocker) -> Result<()> {
    docker.stop_container(CONTAINER).await?;
    docker.start_container(CONTAINER).await
}

pub async fn clean(docker: &CliDocker) -> Result<()> {
    docker.remove_container(CONTAINER, true).await?;
    docker.remove_network(NETWORK).await?;
    docker.remove_volume(VOLUME).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_the_documented_singleton_identity() {
        assert_eq!(NETWORK, "workspace-internal-buildnet");
        assert_eq!(VOLUME, "workspace-internal-buildkit-cache");
        assert_eq!(CONTAINER, "workspace-internal-buildkitd");
        assert_eq!(PORT, 1234);
    }
}
