use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Per-project Docker development workspaces with a shared base image"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create `.workspace.yml` in the current directory.
    Init {
        name: Option<String>,
        #[arg(short, long)]
        force: bool,
    },
    /// Build the shared workspace image.
    Build {
        #[arg(long)]
        no_cache: bool,
    },
    /// Start a workspace, creating its container on first use.
    Start {
        workspace: String,
        #[arg(long)]
        rebuild: bool,
        #[arg(long)]
        no_cache: bool,
        #[arg(long)]
        force_recreate: bool,
        #[arg(long)]
        no_init: bool,
        #[arg(short, long)]
        verbose: bool,
        #[arg(long)]
        path: Option<String>,
    },
    /// Stop a running workspace's container.
    Stop { workspace: String },
    /// Remove one or more workspaces entirely.
    Destroy {
        workspaces: Vec<String>,
        #[arg(long)]
        keep_volumes: bool,
        #[arg(short, long)]
        force: bool,
    },
    /// Show a workspace's container, image, port, and forward state.
    Status { workspace: String },
    /// Show a workspace's resolved configuration.
    Info { workspace: String },
    /// Open a shell inside a running workspace's container.
    Shell {
        workspace: String,
        #[arg(short = 'u', long)]
        user: Option<String>,
        #[arg(long)]
        root: bool,
        #[arg(short = 'c', long)]
        command: Option<String>,
    },
    /// Tunnel every configured forward over SSH.
    Proxy { workspace: String },
    /// Stream or print a workspace's container logs.
    Logs {
        workspace: String,
        #[arg(long, default_value_t = 200)]
        tail: u32,
        #[arg(short, long)]
        follow: bool,
    },
    /// List known workspaces.
    List {
        #[arg(long)]
        path: Option<String>,
    },
    /// Print a workspace's resolved configuration as JSON.
    Config { workspace: String },
    /// Check that required tools and daemons are available.
    Doctor,
    /// Manage the shared BuildKit daemon.
    Buildkit {
        #[arg(long)]
        status: bool,
        #[arg(long)]
        stop: bool,
        #[arg(long)]
        restart: bool,
        #[arg(long)]
        clean: bool,
    },
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Init { name, force } => crate::commands::init::run(name, force),
            Command::Build { no_cache } => crate::commands::build::run(no_cache).await,
            Command::Start {
                workspace,
                rebuild,
                no_cache,
                force_recreate,
                no_init,
                verbose,
                path,
            } => {
                crate::commands::start::run(crate::commands::start::StartArgs {
                    workspace,
                    rebuild,
                    no_cache,
                    force_recreate,
                    no_init,
                    verbose,
                    path,
                })
                .await
            }
            Command::Stop { workspace } => crate::commands::stop::run(&workspace).await,
            Command::Destroy {
                workspaces,
                keep_volumes,
                force,
            } => crate::commands::destroy::run(&workspaces, keep_volumes, force).await,
            Command::Status { workspace } => crate::commands::status::run(&workspace).await,
            Command::Info { workspace } => crate::commands::info::run(&workspace).await,
            Command::Shell {
                workspace,
                user,
                root,
                command,
            } => crate::commands::shell::run(&workspace, user, root, command).await,
            Command::Proxy { workspace } => crate::commands::proxy::run(&workspace).await,
            Command::Logs { workspace, tail, follow } => {
                crate::commands::logs::run(&workspace, tail, follow).await
            }
            Command::List { path } => crate::commands::list::run(path),
            Command::Config { workspace } => crate::commands::config::run(&workspace),
            Command::Doctor => crate::commands::doctor::run().await,
            Command::Buildkit {
                status,
                stop,
                restart,
                clean,
            } => crate::commands::buildkit::run(status, stop, restart, clean).await,
        }
    }
}
