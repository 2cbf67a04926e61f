//! In-container entrypoint: runs as root, brings up dockerd and sshd, then
//! stays alive tailing the daemon log so the container's main process never
//! exits on its own.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{error, info};
use wsctl_core::errors::WsctlError;
use wsctl_core::process::run_captured;

const DOCKERD_LOG: &str = "/var/log/dockerd.log";
const DOCKERD_READY_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run() -> Result<()> {
    crate::uidgid::sync().await?;
    crate::sshkeys::install().await?;
    run_captured(
        "chown",
        &["-R", "workspace:workspace", "/home/workspace/.cache"],
        &HashMap::new(),
        true,
    )
    .await
    .ok();

    spawn_dockerd().await?;
    wait_for_dockerd().await?;

    run_captured("/usr/sbin/sshd", &[] as &[&str], &HashMap::new(), false).await?;

    crate::supervisor::spawn().await;

    tail_forever().await
}

/// Spawn `dockerd` detached from this process, appending its output to
/// `/var/log/dockerd.log`. Used both on startup and by the supervisor when
/// restarting a crashed daemon.
pub async fn spawn_dockerd() -> wsctl_core::errors::Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(DOCKERD_LOG)
        .map_err(|source| WsctlError::Io {
            path: DOCKERD_LOG.to_string(),
            source,
        })?;
    let stderr_file = log_file.try_clone().map_err(|source| WsctlError::Io {
        path: DOCKERD_LOG.to_string(),
        source,
    })?;

    tokio::process::Command::new("dockerd")
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()
        .map_err(|source| WsctlError::Io {
            path: "dockerd".to_string(),
            source,
        })?;
    Ok(())
}

async fn wait_for_dockerd() -> Result<()> {
    let deadline = Instant::now() + DOCKERD_READY_TIMEOUT;
    loop {
        let ready = run_captured("docker", &["version"], &HashMap::new(), true)
            .await
            .map(|out| out.success())
            .unwrap_or(false);
        if ready {
            info!("dockerd is ready");
            return Ok(());
        }
        if Instant::now() > deadline {
            let tail = std::fs::read_to_string(DOCKERD_LOG).unwrap_or_default();
            let last_lines: Vec<&str> = tail.lines().rev().take(50).collect();
            for line in last_lines.iter().rev() {
                error!("{line}");
            }
            bail!("dockerd did not become ready within 30s");
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn tail_forever() -> Result<()> {
    let status = tokio::process::Command::new("tail")
        .args(["-f", DOCKERD_LOG])
        .status()
        .await?;
    if !status.success() {
        bail!("tail -f {DOCKERD_LOG} exited unexpectedly");
    }
    Ok(())
}
