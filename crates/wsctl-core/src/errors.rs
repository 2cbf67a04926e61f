//! Error types and handling
//!
//! Domain-specific error taxonomy for the host controller, following the
//! error handling design's taxonomy of config/state/docker/command/bootstrap
//! failures.

use thiserror::Error;

/// Domain errors for the host controller.
#[derive(Error, Debug)]
pub enum WsctlError {
    #[error("no .workspace.yml found starting from {path}")]
    ConfigMissing { path: String },

    #[error("invalid configuration in {path}: {message}")]
    ConfigInvalid { path: String, message: String },

    #[error("could not acquire state lock at {path} after {attempts} attempts")]
    StateLocked { path: String, attempts: u32 },

    #[error("state file at {path} is corrupt: {message}")]
    StateCorrupt { path: String, message: String },

    #[error("docker is unavailable: {message}")]
    DockerUnavailable { message: String },

    #[error("command `{command}` failed with status {code:?}: {stderr}")]
    CommandFailure {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
        log_path: Option<String>,
    },

    #[error("bootstrap script {script} failed: {message}")]
    BootstrapFailure { script: String, message: String },

    #[error("failed to clone {remote}: {message}")]
    CloneFailure { remote: String, message: String },

    #[error("no workspace named {name} is known")]
    UnknownWorkspace { name: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {path}: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse YAML at {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type Result<T> = std::result::Result<T, WsctlError>;
