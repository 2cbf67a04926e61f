use anyhow::{bail, Result};
use wsctl_core::buildkit;

use crate::commands::context::docker;

pub async fn run(status: bool, stop: bool, restart: bool, clean: bool) -> Result<()> {
    let docker = docker();
    let selected = [status, stop, restart, clean].iter().filter(|b| **b).count();
    if selected != 1 {
        bail!("exactly one of --status, --stop, --restart, --clean is required");
    }

    if status {
        let s = buildkit::status(&docker).await?;
        println!("network:   {}", if s.network_exists { "present" } else { "absent" });
        println!("volume:    {}", if s.volume_exists { "present" } else { "absent" });
        println!("container: {}", if s.container_running { "running" } else { "not running" });
    } else if stop {
        buildkit::stop(&docker).await?;
        println!("shared buildkitd stopped");
    } else if restart {
        buildkit::restart(&docker).await?;
        println!("shared buildkitd restarted");
    } else if clean {
        buildkit::clean(&docker).await?;
        println!("shared buildkit network, volume, and container removed");
    }
    Ok(())
}
