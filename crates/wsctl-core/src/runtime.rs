//! Runtime file
//!
//! Per-workspace JSON blob mounted read-only into the container at
//! `/workspace/config/runtime.json`. Field names are bit-exact lowerCamelCase
//! so the in-container agent (a separate binary, same wire format) can parse
//! it without sharing Rust types across the host/container boundary.

use crate::config::{ResolvedWorkspaceConfig, ScriptSource};
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRepo {
    pub remote: Option<String>,
    pub branch: String,
    pub clone_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeWorkspace {
    pub name: String,
    pub repo: Option<RuntimeRepo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSsh {
    pub port: u32,
    pub selected_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeBootstrapScript {
    pub path: String,
    pub source: ScriptSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeBootstrap {
    pub scripts: Vec<RuntimeBootstrapScript>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeFile {
    pub workspace: RuntimeWorkspace,
    pub ssh: RuntimeSsh,
    pub forwards: Vec<u32>,
    pub bootstrap: RuntimeBootstrap,
}

impl RuntimeFile {
    pub fn from_resolved(resolved: &ResolvedWorkspaceConfig, ssh_port: u32, selected_key: Option<String>) -> Self {
        RuntimeFile {
            workspace: RuntimeWorkspace {
                name: resolved.name.clone(),
                repo: resolved.repo.as_ref().map(|r| RuntimeRepo {
                    remote: r.remote.clone(),
                    branch: r.branch.clone(),
                    clone_args: r.clone_args.clone(),
                }),
            },
            ssh: RuntimeSsh {
                port: ssh_port,
                selected_key,
            },
            forwards: resolved.forwards.clone(),
            bootstrap: RuntimeBootstrap {
                scripts: resolved
                    .bootstrap_scripts
                    .iter()
                    .map(|s| RuntimeBootstrapScript {
                        path: s.path.clone(),
                        source: s.source,
                    })
                    .collect(),
            },
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        crate::fsutil::write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| crate::errors::WsctlError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| crate::errors::WsctlError::Serde {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResolvedBootstrapScript, ResolvedWorkspaceConfig, StatePaths};
    use std::path::PathBuf;

    fn sample_resolved() -> ResolvedWorkspaceConfig {
        ResolvedWorkspaceConfig {
            name: "demo".to_string(),
            config_dir: PathBuf::from("/cfg"),
            repo: None,
            forwards: vec![3000, 8080],
            mounts: vec![],
            bootstrap_scripts: vec![ResolvedBootstrapScript {
                path: "setup.sh".to_string(),
                source: ScriptSource::Project,
            }],
            state: StatePaths {
                root: PathBuf::from("/root"),
                ssh_dir: PathBuf::from("/root/ssh"),
                key_path: PathBuf::from("/root/ssh/id_ed25519"),
                runtime_config_path: PathBuf::from("/root/runtime.json"),
            },
            build_context: PathBuf::from("/build"),
        }
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let resolved = sample_resolved();
        let runtime = RuntimeFile::from_resolved(&resolved, 2300, Some("id_ed25519".to_string()));
        let json = serde_json::to_string(&runtime).unwrap();
        assert!(json.contains("\"selectedKey\""));
        assert!(json.contains("\"cloneArgs\"") == false || json.contains("repo"));
        assert!(json.contains("\"scripts\""));
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("runtime.json");
        let resolved = sample_resolved();
        let runtime = RuntimeFile::from_resolved(&resolved, 2300, None);
        runtime.write(&path).unwrap();
        let loaded = RuntimeFile::load(&path).unwrap();
        assert_eq!(loaded.ssh.port, 2300);
        assert_eq!(loaded.forwards, vec![3000, 8080]);
    }
}
