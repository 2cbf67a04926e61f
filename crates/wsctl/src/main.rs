use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod ui;

fn main() -> Result<()> {
    wsctl_core::logging::init()?;

    let parsed = cli::Cli::parse();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(parsed.dispatch())
}
