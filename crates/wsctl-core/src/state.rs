//! State store
//!
//! A single JSON file (`state.json`) tracking SSH port allocation, forward
//! lists, and the shared image's last build time across all workspaces.
//! All reads and writes go through an exclusive advisory lock acquired
//! with retry+jitter, following the same `fs2`-based lock-before-write
//! discipline a long-lived daemon uses for its own lock file.

use crate::errors::{Result, WsctlError};
use crate::process::run_captured;
use crate::retry::{retry_sync, RetryConfig};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{instrument, warn};

pub const FIRST_SSH_PORT: u32 = 2300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStateRecord {
    pub ssh_port: u32,
    pub forwards: Vec<u32>,
    pub config_dir: String,
    pub selected_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SharedImageState {
    /// RFC3339 / ISO-8601 timestamp of the shared image's last build.
    pub last_build_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateFile {
    pub workspaces: HashMap<String, WorkspaceStateRecord>,
    pub shared_image: SharedImageState,
}

/// Parse a state file tolerantly: a workspace record that doesn't match
/// the expected shape is dropped instead of failing the whole load, so a
/// single corrupted entry can't cascade into a total outage.
fn parse_lenient(contents: &str) -> StateFile {
    let Ok(raw) = serde_json::from_str::<serde_json::Value>(contents) else {
        warn!("state file is not valid JSON, starting from an empty state");
        return StateFile::default();
    };

    let mut state = StateFile::default();
    if let Some(workspaces) = raw.get("workspaces").and_then(|v| v.as_object()) {
        for (name, value) in workspaces {
            match serde_json::from_value::<WorkspaceStateRecord>(value.clone()) {
                Ok(record) => {
                    state.workspaces.insert(name.clone(), record);
                }
                Err(e) => warn!(name, error = %e, "dropping malformed workspace state record"),
            }
        }
    }
    if let Some(shared) = raw.get("sharedImage").or_else(|| raw.get("shared_image")) {
        if let Ok(shared) = serde_json::from_value(shared.clone()) {
            state.shared_image = shared;
        }
    }
    state
}

pub struct StateStore {
    path: PathBuf,
    lock_retry: RetryConfig,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock_retry: RetryConfig::new(
                10,
                Duration::from_millis(50),
                Duration::from_millis(500),
                crate::retry::JitterStrategy::FullJitter,
            ),
        }
    }

    pub fn default_path() -> Self {
        Self::new(crate::paths::state_file_path())
    }

    fn open_and_lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            crate::fsutil::ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| WsctlError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let path_for_error = self.path.display().to_string();
        let attempts = self.lock_retry.max_attempts;
        retry_sync(
            &self.lock_retry,
            || file.try_lock_exclusive(),
            |_| crate::retry::RetryDecision::Retry,
        )
        .map_err(|_| WsctlError::StateLocked {
            path: path_for_error.clone(),
            attempts,
        })?;

        Ok(file)
    }

    /// Read-modify-write under an exclusive lock. `f` receives the current
    /// (lenient-parsed) state and returns the value to hand back to the
    /// caller; the possibly-mutated state is always persisted afterward.
    fn with_lock<T>(&self, f: impl FnOnce(&mut StateFile) -> Result<T>) -> Result<T> {
        let file = self.open_and_lock()?;
        let contents = std::fs::read_to_string(&self.path).unwrap_or_default();
        let mut state = if contents.trim().is_empty() {
            StateFile::default()
        } else {
            parse_lenient(&contents)
        };

        let result = f(&mut state);

        crate::fsutil::write_json_atomic(&self.path, &state)?;
        file.unlock().ok();
        result
    }

    #[instrument(skip(self))]
    pub fn list_workspace_names(&self) -> Result<Vec<String>> {
        self.with_lock(|state| Ok(state.workspaces.keys().cloned().collect()))
    }

    #[instrument(skip(self))]
    pub async fn ensure_workspace_state(
        &self,
        name: &str,
        config_dir: &str,
        forwards: &[u32],
    ) -> Result<WorkspaceStateRecord> {
        // The `ss` probe is async and can't run inside the synchronous
        // `with_lock` closure, so a candidate port is picked from a
        // snapshot taken outside the lock. The snapshot read and the
        // candidate's application are two separate lock acquisitions, but
        // only the second one is allowed to durably decide and persist: it
        // re-checks the candidate against the state on disk at that
        // instant, and if another process already claimed it we discard
        // the candidate and loop back to probe again, rather than writing
        // a port we never re-validated under lock.
        loop {
            let (preassigned, taken) = self.with_lock(|s| {
                let preassigned = s.workspaces.get(name).map(|r| r.ssh_port);
                let taken: HashSet<u32> = s
                    .workspaces
                    .iter()
                    .filter(|(n, _)| n.as_str() != name)
                    .map(|(_, r)| r.ssh_port)
                    .collect();
                Ok((preassigned, taken))
            })?;
            let candidate = match preassigned {
                Some(port) => port,
                None => find_available_ssh_port(&taken).await?,
            };

            let outcome = self.with_lock(|state| {
                let claimed_elsewhere = state
                    .workspaces
                    .iter()
                    .any(|(n, r)| n.as_str() != name && r.ssh_port == candidate);
                if claimed_elsewhere {
                    return Ok(None);
                }
                let selected_key = state.workspaces.get(name).and_then(|r| r.selected_key.clone());
                let record = WorkspaceStateRecord {
                    ssh_port: candidate,
                    forwards: forwards.to_vec(),
                    config_dir: config_dir.to_string(),
                    selected_key,
                };
                state.workspaces.insert(name.to_string(), record.clone());
                Ok(Some(record))
            })?;

            if let Some(record) = outcome {
                return Ok(record);
            }
        }
    }

    #[instrument(skip(self))]
    pub fn set_selected_key(&self, name: &str, key: Option<String>) -> Result<()> {
        self.with_lock(|state| {
            if let Some(record) = state.workspaces.get_mut(name) {
                record.selected_key = key;
            }
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn get_workspace_state(&self, name: &str) -> Result<Option<WorkspaceStateRecord>> {
        self.with_lock(|state| Ok(state.workspaces.get(name).cloned()))
    }

    #[instrument(skip(self))]
    pub fn remove_workspace_state(&self, name: &str) -> Result<()> {
        self.with_lock(|state| {
            state.workspaces.remove(name);
            Ok(())
        })?;
        let dir = crate::paths::workspace_state_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|source| WsctlError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn record_shared_image_build(&self, built_at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.with_lock(|state| {
            state.shared_image.last_build_at = Some(built_at.to_rfc3339());
            Ok(())
        })
    }

    pub fn get_last_shared_image_build(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        self.with_lock(|state| {
            Ok(state
                .shared_image
                .last_build_at
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)))
        })
    }
}

/// Starting at [`FIRST_SSH_PORT`], find the first port neither already
/// recorded in state nor currently listening on the host.
async fn find_available_ssh_port(taken: &HashSet<u32>) -> Result<u32> {
    let mut port = FIRST_SSH_PORT;
    loop {
        if !taken.contains(&port) && !is_port_listening(port).await {
            return Ok(port);
        }
        port += 1;
    }
}

async fn is_port_listening(port: u32) -> bool {
    let pattern = format!(":{port} ");
    match run_captured("ss", &["-tlnH"], &HashMap::new(), true).await {
        Ok(out) => out.stdout.contains(&pattern),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("state.json"))
    }

    #[test]
    #[serial]
    fn ensure_workspace_state_allocates_distinct_ports() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let a = runtime
            .block_on(store.ensure_workspace_state("a", "/a", &[3000]))
            .unwrap();
        let b = runtime
            .block_on(store.ensure_workspace_state("b", "/b", &[3001]))
            .unwrap();
        assert_ne!(a.ssh_port, b.ssh_port);
        assert!(a.ssh_port >= FIRST_SSH_PORT);
        assert!(b.ssh_port >= FIRST_SSH_PORT);
    }

    #[test]
    #[serial]
    fn ensure_workspace_state_is_idempotent_for_same_name() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let first = runtime
            .block_on(store.ensure_workspace_state("a", "/a", &[3000]))
            .unwrap();
        let second = runtime
            .block_on(store.ensure_workspace_state("a", "/a", &[3000, 3001]))
            .unwrap();
        assert_eq!(first.ssh_port, second.ssh_port);
        assert_eq!(second.forwards, vec![3000, 3001]);
    }

    #[test]
    #[serial]
    fn remove_workspace_state_clears_record_and_dir() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime
            .block_on(store.ensure_workspace_state("a", "/a", &[]))
            .unwrap();
        store.remove_workspace_state("a").unwrap();
        assert!(store.get_workspace_state("a").unwrap().is_none());
    }

    #[test]
    fn parse_lenient_drops_malformed_records_but_keeps_good_ones() {
        let contents = r#"{"workspaces":{"good":{"sshPort":2300,"forwards":[],"configDir":"/g","selectedKey":null},"bad":{"sshPort":"nope"}},"sharedImage":{}}"#;
        let state = parse_lenient(contents);
        assert!(state.workspaces.contains_key("good"));
        assert!(!state.workspaces.contains_key("bad"));
    }

    #[test]
    #[serial]
    fn shared_image_build_timestamp_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.get_last_shared_image_build().unwrap().is_none());
        let now = chrono::Utc::now();
        store.record_shared_image_build(now).unwrap();
        let loaded = store.get_last_shared_image_build().unwrap().unwrap();
        assert_eq!(loaded.timestamp(), now.timestamp());
    }
}
