//! Restart-on-crash supervisor for `dockerd` and `sshd`.
//!
//! Wakes every 10 seconds, probes each process by name, and restarts
//! whichever one is missing. Runs for the lifetime of the container.

use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, warn};
use wsctl_core::process::run_captured;

const CHECK_INTERVAL: Duration = Duration::from_secs(10);

pub async fn spawn() {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(CHECK_INTERVAL).await;
            if !process_running("dockerd").await {
                warn!("dockerd missing, restarting");
                if let Err(e) = restart_dockerd().await {
                    error!(error = %e, "failed to restart dockerd");
                }
            }
            if !process_running("sshd").await {
                warn!("sshd missing, restarting");
                if let Err(e) = restart_sshd().await {
                    error!(error = %e, "failed to restart sshd");
                }
            }
        }
    });
}

async fn process_running(name: &str) -> bool {
    run_captured("pgrep", &["-x", name], &HashMap::new(), true)
        .await
        .map(|out| out.success())
        .unwrap_or(false)
}

async fn restart_dockerd() -> wsctl_core::errors::Result<()> {
    crate::entrypoint::spawn_dockerd().await
}

async fn restart_sshd() -> wsctl_core::errors::Result<()> {
    run_captured("/usr/sbin/sshd", &[] as &[&str], &HashMap::new(), false).await?;
    Ok(())
}
