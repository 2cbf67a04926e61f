use anyhow::Result;
use wsctl_core::doctor;

use crate::commands::context::docker;

pub async fn run() -> Result<()> {
    let docker = docker();
    let results = doctor::run_checks(&docker).await;
    let mut all_ok = true;
    for result in &results {
        let mark = if result.ok { "ok" } else { "FAIL" };
        println!("[{mark}] {:<16} {}", result.name, result.detail);
        all_ok &= result.ok;
    }
    if !all_ok {
        anyhow::bail!("one or more checks failed");
    }
    Ok(())
}
