//! SSH key selector
//!
//! Picks a private key for a repository URL: explicit config (exact match,
//! then wildcard pattern), then a filesystem/agent-based default.

use crate::config::SshUserConfig;
use crate::paths;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{instrument, warn};

const NON_KEY_FILES: &[&str] = &["config", "known_hosts", "authorized_keys"];

/// Resolve `raw` (possibly `~/`-prefixed) to an absolute path, relative to
/// the host home for bare names.
fn resolve_key_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        return paths::host_home().join(rest);
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        paths::host_home().join(".ssh").join(raw)
    }
}

/// Convert a `*`-wildcard pattern into an anchored regex, escaping every
/// other metacharacter.
fn wildcard_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    for part in pattern.split('*') {
        out.push_str(&regex::escape(part));
        out.push_str(".*");
    }
    // drop the trailing ".*" added after the final literal segment
    out.truncate(out.len() - 2);
    out.push('$');
    Regex::new(&out).ok()
}

#[instrument(skip(ssh))]
fn match_configured_key(repo_url: &str, ssh: &SshUserConfig) -> Option<PathBuf> {
    if let Some(raw) = ssh.repos.get(repo_url) {
        return Some(resolve_key_path(raw));
    }
    for (pattern, raw) in &ssh.repos {
        if let Some(re) = wildcard_to_regex(pattern) {
            if re.is_match(repo_url) {
                return Some(resolve_key_path(raw));
            }
        }
    }
    None
}

async fn agent_identity_key() -> Option<PathBuf> {
    let sock = std::env::var("SSH_AUTH_SOCK").ok()?;
    if !Path::new(&sock).exists() {
        return None;
    }
    let out = crate::process::run_captured("ssh-add", &["-l"], &HashMap::new(), true)
        .await
        .ok()?;
    if !out.success() {
        return None;
    }
    // ssh-add -l lines look like "256 SHA256:... /home/user/.ssh/id_ed25519 (ED25519)"
    let first_line = out.stdout.lines().next()?;
    let candidate = first_line.split_whitespace().nth(2)?;
    let candidate = PathBuf::from(candidate);
    if candidate.is_file() {
        Some(candidate)
    } else {
        None
    }
}

fn well_known_default_key() -> Option<PathBuf> {
    let ssh_dir = paths::host_home().join(".ssh");
    for name in ["id_ed25519", "id_ecdsa", "id_rsa"] {
        let candidate = ssh_dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn first_private_key_in_ssh_dir() -> Option<PathBuf> {
    let ssh_dir = paths::host_home().join(".ssh");
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&ssh_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
            !NON_KEY_FILES.contains(&name) && !name.ends_with(".pub")
        })
        .collect();
    entries.sort();
    entries
        .into_iter()
        .find(|p| matches!(std::fs::read_to_string(p), Ok(contents) if contents.contains("PRIVATE KEY")))
}

/// Fall back chain when no `ssh.repos` pattern matched (or there is no
/// `ssh.repos` config at all).
#[instrument(skip(ssh))]
pub async fn select_default_key(ssh: &SshUserConfig) -> Option<PathBuf> {
    if let Some(raw) = &ssh.default_key {
        let candidate = resolve_key_path(raw);
        if candidate.is_file() {
            return Some(candidate);
        }
        warn!(path = %candidate.display(), "configured ssh.defaultKey does not exist, ignoring");
    }
    if let Some(key) = agent_identity_key().await {
        return Some(key);
    }
    if let Some(key) = well_known_default_key() {
        return Some(key);
    }
    first_private_key_in_ssh_dir()
}

/// Select the private key to use for `repo_url`, returning the basename
/// suitable for storage in `WorkspaceStateRecord.selected_key`. The full
/// path is only used for logging by the caller.
#[instrument(skip(ssh))]
pub async fn select_key(repo_url: &str, ssh: &SshUserConfig) -> Option<String> {
    let chosen = if repo_url.is_empty() {
        select_default_key(ssh).await
    } else {
        match match_configured_key(repo_url, ssh) {
            Some(path) if path.is_file() => Some(path),
            Some(path) => {
                warn!(path = %path.display(), "configured ssh key for repo does not exist, falling back");
                select_default_key(ssh).await
            }
            None => select_default_key(ssh).await,
        }
    };
    chosen.and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_config(repos: &[(&str, &str)]) -> SshUserConfig {
        SshUserConfig {
            default_key: None,
            repos: repos.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn exact_match_wins_over_pattern() {
        let ssh = ssh_config(&[
            ("git@github.com:org/repo.git", "~/.ssh/id_exact"),
            ("git@github.com:org/*", "~/.ssh/id_pattern"),
        ]);
        let matched = match_configured_key("git@github.com:org/repo.git", &ssh).unwrap();
        assert!(matched.ends_with("id_exact"));
    }

    #[test]
    fn wildcard_pattern_matches_and_escapes_metacharacters() {
        let ssh = ssh_config(&[("git@github.com:org/*", "~/.ssh/id_pattern")]);
        let matched = match_configured_key("git@github.com:org/repo.git", &ssh).unwrap();
        assert!(matched.ends_with("id_pattern"));

        let ssh_dot = ssh_config(&[("git@github.com:org/a.b", "~/.ssh/id_dot")]);
        assert!(match_configured_key("git@github.comXorgXaXb", &ssh_dot).is_none());
    }

    #[test]
    fn no_match_returns_none() {
        let ssh = ssh_config(&[("git@gitlab.com:*", "~/.ssh/id_gitlab")]);
        assert!(match_configured_key("git@github.com:org/repo.git", &ssh).is_none());
    }

    #[test]
    fn wildcard_to_regex_anchors_the_whole_string() {
        let re = wildcard_to_regex("git@github.com:org/*").unwrap();
        assert!(re.is_match("git@github.com:org/repo.git"));
        assert!(!re.is_match("evilgit@github.com:org/repo.git"));
    }
}
