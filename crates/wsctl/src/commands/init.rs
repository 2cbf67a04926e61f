use anyhow::{bail, Result};
use std::path::Path;
use wsctl_core::paths;

const TEMPLATE: &str = r#"# Workspace project configuration.
# repo:
#   remote: git@github.com:org/repo.git
#   branch: main
# forwards:
#   - 3000
#   - "5000-5003"
# mounts:
#   - ./data:/workspace/data
# bootstrap:
#   scripts:
#     - scripts/setup.sh
"#;

pub fn run(name: Option<String>, force: bool) -> Result<()> {
    let path = Path::new(paths::project_config_file_name());
    if path.exists() && !force {
        bail!("{} already exists; pass -f to overwrite", path.display());
    }
    std::fs::write(path, TEMPLATE)?;
    let label = name.unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "workspace".to_string())
    });
    println!("Created {} for workspace '{}'", path.display(), label);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn creates_config_in_cwd() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        run(Some("demo".to_string()), false).unwrap();
        assert!(dir.path().join(".workspace.yml").exists());
        std::env::set_current_dir(previous).unwrap();
    }

    #[test]
    #[serial]
    fn refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        run(None, false).unwrap();
        let err = run(None, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        std::env::set_current_dir(previous).unwrap();
    }
}
