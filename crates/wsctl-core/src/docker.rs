//! Docker adapter
//!
//! A thin, idempotent wrapper over the `docker` CLI. No Docker API client:
//! every operation shells out and is defined by the guarantee it leaves
//! behind, not by how it gets there.

use crate::errors::{Result, WsctlError};
use crate::process::{run_captured, run_logged, run_streaming, CapturedOutput};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInspect {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "State")]
    pub state: ContainerInspectState,
    #[serde(rename = "Config")]
    pub config: ContainerInspectConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInspectState {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Running")]
    pub running: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerInspectConfig {
    #[serde(rename = "Image")]
    pub image: String,
}

pub struct CliDocker {
    docker_path: String,
}

impl Default for CliDocker {
    fn default() -> Self {
        Self::new()
    }
}

impl CliDocker {
    pub fn new() -> Self {
        Self {
            docker_path: "docker".to_string(),
        }
    }

    pub fn with_path(docker_path: String) -> Self {
        Self { docker_path }
    }

    async fn run(&self, args: &[&str]) -> Result<CapturedOutput> {
        run_captured(&self.docker_path, args, &HashMap::new(), true).await
    }

    #[instrument(skip(self))]
    pub async fn check_installed(&self) -> Result<()> {
        let out = self.run(&["version", "--format", "{{.Server.Version}}"]).await?;
        if !out.success() {
            return Err(WsctlError::DockerUnavailable {
                message: out.stderr,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn info_ready(&self) -> bool {
        matches!(self.run(&["info", "--format", "{{.ServerVersion}}"]).await, Ok(out) if out.success())
    }

    pub async fn image_exists(&self, tag: &str) -> Result<bool> {
        let out = self.run(&["image", "inspect", tag]).await?;
        Ok(out.success())
    }

    pub async fn container_exists(&self, name: &str) -> Result<bool> {
        let out = self.run(&["container", "inspect", name]).await?;
        Ok(out.success())
    }

    pub async fn volume_exists(&self, name: &str) -> Result<bool> {
        let out = self.run(&["volume", "inspect", name]).await?;
        Ok(out.success())
    }

    pub async fn network_exists(&self, name: &str) -> Result<bool> {
        let out = self.run(&["network", "inspect", name]).await?;
        Ok(out.success())
    }

    #[instrument(skip(self, log_path))]
    pub async fn build_image(
        &self,
        tag: &str,
        context_dir: &Path,
        no_cache: bool,
        log_path: &Path,
    ) -> Result<()> {
        let mut args: Vec<String> = vec!["build".into(), "-t".into(), tag.into()];
        if no_cache {
            args.push("--no-cache".into());
        }
        args.push(context_dir.display().to_string());
        run_logged(&self.docker_path, &args, &HashMap::new(), log_path).await?;
        Ok(())
    }

    /// `docker run` with fully assembled arguments (already includes
    /// `--detach` and the image tag as the final argument).
    #[instrument(skip(self, run_args))]
    pub async fn create_container(&self, run_args: &[String]) -> Result<String> {
        let out = run_captured(&self.docker_path, run_args, &HashMap::new(), false).await?;
        Ok(out.stdout.trim().to_string())
    }

    pub async fn start_container(&self, name: &str) -> Result<()> {
        self.run(&["start", name]).await?;
        Ok(())
    }

    pub async fn stop_container(&self, name: &str) -> Result<()> {
        let out = self.run(&["stop", name]).await?;
        if !out.success() && !out.stderr.contains("is not running") {
            warn!(name, stderr = %out.stderr, "docker stop reported an error");
        }
        Ok(())
    }

    pub async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(name);
        let out = self.run(&args).await?;
        if !out.success() && !out.stderr.contains("No such container") {
            warn!(name, stderr = %out.stderr, "docker rm reported an error");
        }
        Ok(())
    }

    pub async fn remove_volume(&self, name: &str) -> Result<()> {
        let out = self.run(&["volume", "rm", name]).await?;
        if !out.success() && !out.stderr.contains("no such volume") {
            warn!(name, stderr = %out.stderr, "docker volume rm reported an error");
        }
        Ok(())
    }

    pub async fn remove_network(&self, name: &str) -> Result<()> {
        let out = self.run(&["network", "rm", name]).await?;
        if !out.success() && !out.stderr.contains("not found") {
            warn!(name, stderr = %out.stderr, "docker network rm reported an error");
        }
        Ok(())
    }

    pub async fn create_network(&self, name: &str) -> Result<()> {
        if !self.network_exists(name).await? {
            self.run(&["network", "create", name]).await?;
        }
        Ok(())
    }

    pub async fn create_volume(&self, name: &str) -> Result<()> {
        if !self.volume_exists(name).await? {
            self.run(&["volume", "create", name]).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn connect_to_network(&self, container: &str, network: &str) -> Result<()> {
        let out = self.run(&["network", "connect", network, container]).await?;
        if !out.success() && !out.stderr.contains("already exists in network") {
            return Err(WsctlError::DockerUnavailable {
                message: out.stderr,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInspect>> {
        let out = self.run(&["inspect", name]).await?;
        if !out.success() {
            return Ok(None);
        }
        let mut parsed: Vec<ContainerInspect> =
            serde_json::from_str(&out.stdout).map_err(|source| WsctlError::Serde {
                path: format!("docker inspect {name}"),
                source,
            })?;
        Ok(parsed.pop())
    }

    #[instrument(skip(self, argv))]
    pub async fn exec_captured(
        &self,
        container: &str,
        argv: &[&str],
        user: Option<&str>,
    ) -> Result<CapturedOutput> {
        let mut args = vec!["exec".to_string()];
        if let Some(user) = user {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        args.push(container.to_string());
        args.extend(argv.iter().map(|s| s.to_string()));
        run_captured(&self.docker_path, &args, &HashMap::new(), false).await
    }

    /// `docker exec -it`/`-i` for interactive shells, proxy tunnels, etc.
    pub async fn exec_streaming(
        &self,
        container: &str,
        argv: &[&str],
        user: Option<&str>,
        tty: bool,
        env: &HashMap<String, String>,
    ) -> Result<Option<i32>> {
        let mut args = vec!["exec".to_string()];
        args.push(if tty { "-it".to_string() } else { "-i".to_string() });
        if let Some(user) = user {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(container.to_string());
        args.extend(argv.iter().map(|s| s.to_string()));
        run_streaming(&self.docker_path, &args, &HashMap::new()).await
    }

    pub async fn logs(&self, container: &str, tail: u32, follow: bool) -> Result<Option<i32>> {
        let mut args = vec!["logs".to_string(), "--tail".to_string(), tail.to_string()];
        if follow {
            args.push("--follow".to_string());
        }
        args.push(container.to_string());
        run_streaming(&self.docker_path, &args, &HashMap::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_state_deserializes_minimal_shape() {
        let json = r#"[{"Id":"abc","State":{"Status":"running","Running":true},"Config":{"Image":"workspace:latest"}}]"#;
        let parsed: Vec<ContainerInspect> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].id, "abc");
        assert!(parsed[0].state.running);
        assert_eq!(parsed[0].config.image, "workspace:latest");
    }

    #[tokio::test]
    async fn container_exists_false_for_unknown_name() {
        let docker = CliDocker::new();
        // Exercises the non-zero-exit path without requiring a running daemon
        // in environments where `docker` resolves but has no such container.
        if docker.check_installed().await.is_err() {
            return;
        }
        let exists = docker.container_exists("wsctl-test-nonexistent").await.unwrap();
        assert!(!exists);
    }
}
