//! Config resolver
//!
//! Finds the nearest project config, merges it with the user config, and
//! normalizes the dynamically-shaped `forwards`/`mounts`/`bootstrap.scripts`
//! fields into a single canonical [`ResolvedWorkspaceConfig`].

use crate::errors::{Result, WsctlError};
use crate::identity::WorkspaceIdentity;
use crate::paths;
use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepoConfig {
    pub remote: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub clone_args: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// A forward entry as it may appear in YAML: a bare port, an inclusive
/// range string, or `{internal: ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForwardEntry {
    Int(i64),
    Str(String),
    Internal { internal: InternalValue },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InternalValue {
    Int(i64),
    Str(String),
}

/// A bootstrap script entry: a bare path, or `{path, source}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BootstrapEntry {
    Path(String),
    Tagged { path: String, source: ScriptSource },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptSource {
    Project,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    #[serde(default)]
    pub scripts: Vec<BootstrapEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub repo: Option<RepoConfig>,
    #[serde(default)]
    pub forwards: Vec<ForwardEntry>,
    #[serde(default)]
    pub mounts: Vec<String>,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub mount_agents_credentials: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SshUserConfig {
    pub default_key: Option<String>,
    /// Keyed by repo URL pattern; an [`IndexMap`] rather than a
    /// [`HashMap`] so the first declared pattern that matches wins, the
    /// way the config file reads top to bottom.
    #[serde(default)]
    pub repos: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    pub repo: Option<RepoConfig>,
    #[serde(default)]
    pub forwards: Vec<ForwardEntry>,
    #[serde(default)]
    pub mounts: Vec<String>,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub mount_agents_credentials: Option<bool>,
    #[serde(default)]
    pub ssh: SshUserConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    Ro,
    Rw,
}

impl std::fmt::Display for MountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountMode::Ro => write!(f, "ro"),
            MountMode::Rw => write!(f, "rw"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMount {
    pub source: String,
    pub target: String,
    pub mode: MountMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBootstrapScript {
    pub path: String,
    pub source: ScriptSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePaths {
    pub root: PathBuf,
    pub ssh_dir: PathBuf,
    pub key_path: PathBuf,
    pub runtime_config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedWorkspaceConfig {
    pub name: String,
    pub config_dir: PathBuf,
    pub repo: Option<RepoConfig>,
    pub forwards: Vec<u32>,
    pub mounts: Vec<ResolvedMount>,
    pub bootstrap_scripts: Vec<ResolvedBootstrapScript>,
    pub state: StatePaths,
    pub build_context: PathBuf,
}

/// Expand `forwards` entries into a flat, ordered list of ports.
///
/// Malformed or out-of-range entries are dropped rather than propagated:
/// the config resolver is best-effort over a dynamically-shaped source field.
pub fn normalize_forwards(entries: &[ForwardEntry]) -> Vec<u32> {
    let mut out = Vec::new();
    for entry in entries {
        match entry {
            ForwardEntry::Int(n) => push_single_port(&mut out, *n),
            ForwardEntry::Internal {
                internal: InternalValue::Int(n),
            } => push_single_port(&mut out, *n),
            ForwardEntry::Internal {
                internal: InternalValue::Str(s),
            } => push_range_or_port(&mut out, s),
            ForwardEntry::Str(s) => push_range_or_port(&mut out, s),
        }
    }
    out
}

fn push_single_port(out: &mut Vec<u32>, n: i64) {
    if n > 0 {
        out.push(n as u32);
    } else {
        warn!("dropping non-positive forward port {n}");
    }
}

fn push_range_or_port(out: &mut Vec<u32>, s: &str) {
    if let Some((start, end)) = s.split_once('-').or_else(|| s.split_once(':')) {
        match (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
            (Ok(a), Ok(b)) if a <= b => out.extend(a..=b),
            _ => warn!("dropping malformed or inverted forward range '{s}'"),
        }
    } else {
        match s.trim().parse::<u32>() {
            Ok(n) if n > 0 => out.push(n),
            _ => warn!("dropping malformed forward entry '{s}'"),
        }
    }
}

/// Normalize one `SOURCE:TARGET[:ro|:rw]` mount string. Windows drive
/// prefixes (`C:/path:/target`) are handled by treating a leading
/// single-letter component plus colon as part of the source.
pub fn normalize_mount(raw: &str, config_dir: &Path) -> Option<ResolvedMount> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (source_raw, target, mode_str) = match parts.len() {
        3 => (parts[0], parts[1], Some(parts[2])),
        2 => (parts[0], parts[1], None),
        4 if parts[0].len() == 1 => {
            let source = format!("{}:{}", parts[0], parts[1]);
            return normalize_mount_parts(&source, parts[2], Some(parts[3]), config_dir);
        }
        _ => {
            warn!("dropping mount with unexpected shape '{raw}'");
            return None;
        }
    };
    normalize_mount_parts(source_raw, target, mode_str, config_dir)
}

fn normalize_mount_parts(
    source_raw: &str,
    target: &str,
    mode_str: Option<&str>,
    config_dir: &Path,
) -> Option<ResolvedMount> {
    let mode = match mode_str {
        Some("ro") => MountMode::Ro,
        Some("rw") | None => MountMode::Rw,
        Some(_) => MountMode::Rw,
    };
    let source = resolve_source_path(source_raw, config_dir);
    Some(ResolvedMount {
        source,
        target: target.to_string(),
        mode,
    })
}

fn resolve_source_path(source: &str, config_dir: &Path) -> String {
    if let Some(rest) = source.strip_prefix("~/") {
        return paths::host_home().join(rest).display().to_string();
    }
    let path = Path::new(source);
    if path.is_absolute() || source.len() >= 2 && source.as_bytes()[1] == b':' {
        source.to_string()
    } else {
        config_dir.join(path).display().to_string()
    }
}

/// Merge project and user config (project first, user second for list
/// fields; user overrides project for scalar fields) and normalize.
#[instrument(skip(project, user))]
pub fn resolve_config(
    project: &ProjectConfig,
    user: &UserConfig,
    config_dir: &Path,
    identity: &WorkspaceIdentity,
    build_context: PathBuf,
) -> Result<ResolvedWorkspaceConfig> {
    let mut forward_entries = project.forwards.clone();
    forward_entries.extend(user.forwards.clone());
    let forwards = normalize_forwards(&forward_entries);

    let mut mounts: Vec<ResolvedMount> = project
        .mounts
        .iter()
        .chain(user.mounts.iter())
        .filter_map(|m| normalize_mount(m, config_dir))
        .collect();

    let mount_agents_credentials = user
        .mount_agents_credentials
        .or(project.mount_agents_credentials)
        .unwrap_or(false);
    if mount_agents_credentials {
        for path in paths::agent_credential_paths() {
            if path.exists() {
                // Several agents' credential files share the basename
                // `auth.json`; key the mount target on the parent
                // directory too so distinct sources never collide on the
                // same container path.
                let parent_name = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let file_name = path.file_name().unwrap().to_string_lossy();
                mounts.push(ResolvedMount {
                    source: path.display().to_string(),
                    target: format!("/host-credentials/{parent_name}/{file_name}"),
                    mode: MountMode::Rw,
                });
            }
        }
    }

    let mut bootstrap_scripts: Vec<ResolvedBootstrapScript> = project
        .bootstrap
        .scripts
        .iter()
        .map(|e| tag_bootstrap_entry(e, ScriptSource::Project))
        .collect();
    bootstrap_scripts.extend(
        user.bootstrap
            .scripts
            .iter()
            .map(|e| tag_bootstrap_entry(e, ScriptSource::User)),
    );

    let repo = match (&user.repo, &project.repo) {
        (Some(u), Some(p)) => Some(RepoConfig {
            remote: u.remote.clone().or_else(|| p.remote.clone()),
            branch: if u.remote.is_some() { u.branch.clone() } else { p.branch.clone() },
            clone_args: if u.clone_args.is_empty() { p.clone_args.clone() } else { u.clone_args.clone() },
        }),
        (Some(u), None) => Some(u.clone()),
        (None, Some(p)) => Some(p.clone()),
        (None, None) => None,
    };

    let root = paths::workspace_state_dir(&identity.name);
    let state = StatePaths {
        ssh_dir: root.join("ssh"),
        key_path: root.join("ssh").join("id_ed25519"),
        runtime_config_path: root.join("runtime.json"),
        root,
    };

    debug!(name = %identity.name, forwards = forwards.len(), mounts = mounts.len(), "resolved workspace config");

    Ok(ResolvedWorkspaceConfig {
        name: identity.name.clone(),
        config_dir: config_dir.to_path_buf(),
        repo,
        forwards,
        mounts,
        bootstrap_scripts,
        state,
        build_context,
    })
}

fn tag_bootstrap_entry(entry: &BootstrapEntry, default_source: ScriptSource) -> ResolvedBootstrapScript {
    match entry {
        BootstrapEntry::Path(path) => ResolvedBootstrapScript {
            path: path.clone(),
            source: default_source,
        },
        BootstrapEntry::Tagged { path, source } => ResolvedBootstrapScript {
            path: path.clone(),
            source: *source,
        },
    }
}

/// Walk up from `start` looking for `.workspace.yml`, stopping at `stop_at`
/// (typically the VCS repo root or host home) or the filesystem root.
pub fn find_workspace_dir(start: &Path, stop_at: Option<&Path>) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(paths::project_config_file_name()).is_file() {
            return Ok(dir);
        }
        if let Some(stop) = stop_at {
            if dir == stop {
                break;
            }
        }
        if dir == paths::host_home() {
            break;
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }
    Err(WsctlError::ConfigMissing {
        path: start.display().to_string(),
    })
}

const USER_CONFIG_TEMPLATE: &str = r#"# Workspace user configuration.
# ssh:
#   defaultKey: ~/.ssh/id_ed25519
#   repos:
#     "git@github.com:org/*": ~/.ssh/id_work
# bootstrap:
#   scripts:
#     - path: userscripts/example.sh
"#;

/// Create `<hostHome>/.workspaces/{userscripts/, config.yml}` on first use.
pub fn ensure_user_config() -> Result<()> {
    let dir = paths::workspaces_root();
    crate::fsutil::ensure_dir(&dir)?;
    crate::fsutil::ensure_dir(&paths::userscripts_dir())?;
    let config_path = paths::user_config_path();
    if !config_path.exists() {
        std::fs::write(&config_path, USER_CONFIG_TEMPLATE).map_err(|source| WsctlError::Io {
            path: config_path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

pub fn load_project_config(path: &Path) -> Result<ProjectConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| WsctlError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| WsctlError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| WsctlError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| WsctlError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_expand_ranges_in_order() {
        let entries = vec![
            ForwardEntry::Int(3000),
            ForwardEntry::Str("5000-5003".to_string()),
            ForwardEntry::Int(8080),
            ForwardEntry::Str("9000-9001".to_string()),
            ForwardEntry::Str("7000-7000".to_string()),
        ];
        assert_eq!(
            normalize_forwards(&entries),
            vec![3000, 5000, 5001, 5002, 5003, 8080, 9000, 9001, 7000]
        );
    }

    #[test]
    fn forwards_reject_non_positive() {
        let entries = vec![ForwardEntry::Int(0), ForwardEntry::Int(-1)];
        assert!(normalize_forwards(&entries).is_empty());
    }

    #[test]
    fn forwards_drop_malformed_range() {
        let entries = vec![ForwardEntry::Str("5003-5000".to_string())];
        assert!(normalize_forwards(&entries).is_empty());
    }

    #[test]
    fn mount_defaults_to_rw() {
        let mount = normalize_mount("/tmp/a:/workspace/a", Path::new("/cfg")).unwrap();
        assert_eq!(mount.mode, MountMode::Rw);
        assert_eq!(mount.target, "/workspace/a");
    }

    #[test]
    fn mount_parses_explicit_ro() {
        let mount = normalize_mount("/tmp/a:/workspace/a:ro", Path::new("/cfg")).unwrap();
        assert_eq!(mount.mode, MountMode::Ro);
    }

    #[test]
    fn mount_handles_windows_drive_prefix() {
        let mount = normalize_mount("C:/path:/container/path:ro", Path::new("/cfg")).unwrap();
        assert_eq!(mount.source, "C:/path");
        assert_eq!(mount.target, "/container/path");
        assert_eq!(mount.mode, MountMode::Ro);
    }

    #[test]
    fn mount_resolves_relative_source_against_config_dir() {
        let mount = normalize_mount("rel/dir:/workspace/rel", Path::new("/cfg")).unwrap();
        assert_eq!(mount.source, "/cfg/rel/dir");
    }

    #[test]
    fn bootstrap_scripts_concatenate_project_then_user() {
        let project = ProjectConfig {
            bootstrap: BootstrapConfig {
                scripts: vec![BootstrapEntry::Path("01.sh".to_string())],
            },
            ..Default::default()
        };
        let user = UserConfig {
            bootstrap: BootstrapConfig {
                scripts: vec![BootstrapEntry::Path("setup.sh".to_string())],
            },
            ..Default::default()
        };
        let identity = WorkspaceIdentity::new(Path::new("/cfg"), None);
        let resolved = resolve_config(&project, &user, Path::new("/cfg"), &identity, PathBuf::from("/build"))
            .unwrap();
        assert_eq!(resolved.bootstrap_scripts.len(), 2);
        assert_eq!(resolved.bootstrap_scripts[0].source, ScriptSource::Project);
        assert_eq!(resolved.bootstrap_scripts[1].source, ScriptSource::User);
    }
}
