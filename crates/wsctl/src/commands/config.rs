use anyhow::Result;

use crate::commands::context::resolve_by_name;

pub fn run(workspace: &str) -> Result<()> {
    let resolved = resolve_by_name(workspace)?;
    let json = serde_json::to_string_pretty(&resolved)?;
    println!("{json}");
    Ok(())
}
