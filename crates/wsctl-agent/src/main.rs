use anyhow::{bail, Result};
use std::path::PathBuf;

mod entrypoint;
mod init;
mod sshkeys;
mod supervisor;
mod uidgid;

/// Host-mounted directory (see `-v .../logs:/workspace/logs:rw` in the
/// host CLI's container launch) that per-workspace init logs land in so
/// they survive the container and are visible from the host.
const LOGS_DIR: &str = "/workspace/logs";

fn main() -> Result<()> {
    let command = std::env::args().nth(1).unwrap_or_default();

    wsctl_core::logging::init_agent(init_log_path(&command).as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match command.as_str() {
        "entrypoint" => runtime.block_on(entrypoint::run()),
        "init" => runtime.block_on(init::run()),
        other => bail!("unknown command '{other}', expected 'entrypoint' or 'init'"),
    }
}

/// For `init`, always write a per-workspace log file under `LOGS_DIR`
/// timestamped at invocation, named from `WORKSPACE_NAME`. `entrypoint`
/// runs before the workspace name is meaningfully scoped to a single
/// init attempt, so it logs to stdout only.
fn init_log_path(command: &str) -> Option<PathBuf> {
    if command != "init" {
        return None;
    }
    let name = std::env::var("WORKSPACE_NAME").unwrap_or_else(|_| "workspace".to_string());
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    Some(PathBuf::from(LOGS_DIR).join(format!("{name}-{timestamp}.log")))
}
