//! Doctor diagnostics
//!
//! `wsctl doctor` runs a battery of independent, non-fatal checks and
//! reports each one; no single failing check aborts the others.

use crate::docker::CliDocker;
use crate::paths;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

const REQUIRED_BINARIES: &[&str] = &["docker", "ssh", "ssh-keygen", "git", "ssh-keyscan", "ss"];

async fn binary_on_path(name: &str) -> CheckResult {
    let ok = crate::process::run_captured("which", &[name], &HashMap::new(), true)
        .await
        .map(|out| out.success())
        .unwrap_or(false);
    CheckResult {
        name: format!("{name} on PATH"),
        ok,
        detail: if ok {
            "found".to_string()
        } else {
            format!("`{name}` was not found on PATH")
        },
    }
}

async fn docker_daemon_ready(docker: &CliDocker) -> CheckResult {
    let ok = docker.info_ready().await;
    CheckResult {
        name: "docker daemon".to_string(),
        ok,
        detail: if ok {
            "responding".to_string()
        } else {
            "`docker info` did not succeed".to_string()
        },
    }
}

fn workspaces_root_writable() -> CheckResult {
    let root = paths::workspaces_root();
    let ok = crate::fsutil::ensure_dir(&root).is_ok();
    CheckResult {
        name: "workspaces root".to_string(),
        ok,
        detail: if ok {
            format!("{} exists and is writable", root.display())
        } else {
            format!("could not create or write to {}", root.display())
        },
    }
}

/// Run every check concurrently and return results in a stable order.
pub async fn run_checks(docker: &CliDocker) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(REQUIRED_BINARIES.len() + 2);
    for name in REQUIRED_BINARIES {
        results.push(binary_on_path(name).await);
    }
    results.push(docker_daemon_ready(docker).await);
    results.push(workspaces_root_writable());
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspaces_root_check_reports_a_path_in_its_detail() {
        let result = workspaces_root_writable();
        assert!(result.detail.contains(".workspaces") || !result.ok);
    }
}
