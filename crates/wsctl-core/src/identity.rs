//! Workspace identity
//!
//! A `WorkspaceIdentity` is derived once, from the basename of the
//! directory containing the project config (or an explicit override), and
//! is treated as immutable for the rest of a command's lifetime.

use std::path::Path;

pub const SHARED_IMAGE_TAG: &str = "workspace:latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceIdentity {
    pub name: String,
    pub container_name: String,
    pub image_tag: String,
}

impl WorkspaceIdentity {
    pub fn new(config_dir: &Path, name_override: Option<&str>) -> Self {
        let name = name_override
            .map(str::to_string)
            .or_else(|| {
                config_dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "workspace".to_string());

        Self {
            container_name: format!("workspace-{name}"),
            image_tag: SHARED_IMAGE_TAG.to_string(),
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn derives_name_from_directory_basename() {
        let identity = WorkspaceIdentity::new(&PathBuf::from("/home/user/my-project"), None);
        assert_eq!(identity.name, "my-project");
        assert_eq!(identity.container_name, "workspace-my-project");
        assert_eq!(identity.image_tag, SHARED_IMAGE_TAG);
    }

    #[test]
    fn explicit_override_wins() {
        let identity = WorkspaceIdentity::new(&PathBuf::from("/home/user/my-project"), Some("x"));
        assert_eq!(identity.name, "x");
        assert_eq!(identity.container_name, "workspace-x");
    }
}
