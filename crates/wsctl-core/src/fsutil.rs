//! Filesystem helpers
//!
//! Small primitives shared by the config resolver, state store, and the
//! in-container agent: directory creation, atomic JSON writes, and
//! tolerant-of-missing-file JSON reads.

use crate::errors::{Result, WsctlError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| WsctlError::Io {
        path: dir.display().to_string(),
        source,
    })
}

pub fn path_exists(path: &Path) -> bool {
    path.exists()
}

/// Recursively sort object keys so repeated writes of equal data produce
/// byte-identical output.
fn sort_json_object(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<_, _> = map.iter().collect();
            *map = sorted
                .into_iter()
                .map(|(k, v)| {
                    let mut v = v.clone();
                    sort_json_object(&mut v);
                    (k.clone(), v)
                })
                .collect();
        }
        serde_json::Value::Array(arr) => {
            for item in arr {
                sort_json_object(item);
            }
        }
        _ => {}
    }
}

/// Write `value` to `path` as pretty-printed, key-sorted JSON. Writes to a
/// sibling `.{name}.tmp` file first, then renames, so readers never observe
/// a partially written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut json_value = serde_json::to_value(value).map_err(|source| WsctlError::Serde {
        path: path.display().to_string(),
        source,
    })?;
    sort_json_object(&mut json_value);
    let json = serde_json::to_string_pretty(&json_value).map_err(|source| WsctlError::Serde {
        path: path.display().to_string(),
        source,
    })?;

    let temp_path = sibling_temp_path(path);
    fs::write(&temp_path, json.as_bytes()).map_err(|source| WsctlError::Io {
        path: temp_path.display().to_string(),
        source,
    })?;

    #[cfg(windows)]
    if path.exists() {
        fs::remove_file(path).map_err(|source| WsctlError::Io {
            path: path.display().to_string(),
            source,
        })?;
    }

    fs::rename(&temp_path, path).map_err(|source| WsctlError::Io {
        path: path.display().to_string(),
        source,
    })?;

    Ok(())
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("wsctl");
    match path.parent() {
        Some(parent) => parent.join(format!(".{file_name}.tmp")),
        None => PathBuf::from(format!(".{file_name}.tmp")),
    }
}

/// Read JSON from `path`, returning `default` when the file does not exist.
pub fn read_json_or_default<T: DeserializeOwned>(path: &Path, default: T) -> Result<T> {
    if !path.exists() {
        return Ok(default);
    }
    let contents = fs::read_to_string(path).map_err(|source| WsctlError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| WsctlError::Serde {
        path: path.display().to_string(),
        source,
    })
}

/// Return plain files directly under `dir` with any execute bit set,
/// sorted ascending by filename.
#[cfg(unix)]
pub fn list_executable_files(dir: &Path) -> Result<Vec<PathBuf>> {
    use std::os::unix::fs::PermissionsExt;

    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(dir).map_err(|source| WsctlError::Io {
        path: dir.display().to_string(),
        source,
    })? {
        let entry = entry.map_err(|source| WsctlError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let mode = entry
            .metadata()
            .map_err(|source| WsctlError::Io {
                path: path.display().to_string(),
                source,
            })?
            .permissions()
            .mode();
        if mode & 0o111 != 0 {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Blob {
        b: i32,
        a: i32,
    }

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let blob = Blob { b: 2, a: 1 };
        write_json_atomic(&path, &blob).unwrap();
        let read: Blob = read_json_or_default(&path, Blob { a: 0, b: 0 }).unwrap();
        assert_eq!(read, blob);
    }

    #[test]
    fn write_sorts_keys_deterministically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &Blob { b: 2, a: 1 }).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.find("\"a\"").unwrap() < contents.find("\"b\"").unwrap());
    }

    #[test]
    fn missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        let read: Blob = read_json_or_default(&path, Blob { a: 7, b: 8 }).unwrap();
        assert_eq!(read, Blob { a: 7, b: 8 });
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &Blob { a: 1, b: 2 }).unwrap();
        assert!(!dir.path().join(".state.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn list_executable_files_filters_and_sorts() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        for (name, exec) in [("b.sh", true), ("a.sh", true), ("c.txt", false)] {
            let p = dir.path().join(name);
            fs::write(&p, "#!/bin/sh\n").unwrap();
            let mut perm = fs::metadata(&p).unwrap().permissions();
            perm.set_mode(if exec { 0o755 } else { 0o644 });
            fs::set_permissions(&p, perm).unwrap();
        }
        let files = list_executable_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.sh", "b.sh"]);
    }
}
