use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the config file looked up in the store root.
pub const CONFIG_FILE: &str = "stackyard.toml";

/// Engine settings. Relative directories are resolved against the store root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Holds `apps/list.json` and the version templates under `apps/<key>/<version>`.
    pub resource_dir: PathBuf,
    /// Install directories are created under `<app_dir>/<key>/<name>`.
    pub app_dir: PathBuf,
    /// Container backend: `docker`, or `mock` for dry runs.
    pub backend: String,
    pub docker_bin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resource_dir: PathBuf::from("resource"),
            app_dir: PathBuf::from("apps"),
            backend: "docker".to_owned(),
            docker_bin: "docker".to_owned(),
        }
    }
}

impl EngineConfig {
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        toml::from_str(input).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Load `stackyard.toml` from the store root, or the defaults when absent.
    /// Relative paths are made absolute against `store_root`.
    pub fn for_store(store_root: &Path, explicit: Option<&Path>) -> Result<Self, CoreError> {
        let default_path = store_root.join(CONFIG_FILE);
        let config = match explicit {
            Some(path) => Self::load(path)?,
            None if default_path.exists() => Self::load(&default_path)?,
            None => {
                debug!("no {CONFIG_FILE} in {}, using defaults", store_root.display());
                Self::default()
            }
        };
        Ok(config.rooted_at(store_root))
    }

    #[must_use]
    pub fn rooted_at(mut self, store_root: &Path) -> Self {
        if self.resource_dir.is_relative() {
            self.resource_dir = store_root.join(&self.resource_dir);
        }
        if self.app_dir.is_relative() {
            self.app_dir = store_root.join(&self.app_dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_rooted_in_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::for_store(dir.path(), None).unwrap();
        assert_eq!(config.resource_dir, dir.path().join("resource"));
        assert_eq!(config.app_dir, dir.path().join("apps"));
        assert_eq!(config.backend, "docker");
        assert_eq!(config.docker_bin, "docker");
    }

    #[test]
    fn store_config_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "resource_dir = \"/opt/1panel/resource\"\ndocker_bin = \"/usr/bin/docker\"\n",
        )
        .unwrap();
        let config = EngineConfig::for_store(dir.path(), None).unwrap();
        assert_eq!(config.resource_dir, PathBuf::from("/opt/1panel/resource"));
        assert_eq!(config.app_dir, dir.path().join("apps"));
        assert_eq!(config.docker_bin, "/usr/bin/docker");
    }

    #[test]
    fn explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "app_dir = \"a\"\n").unwrap();
        let other = dir.path().join("other.toml");
        std::fs::write(&other, "app_dir = \"b\"\n").unwrap();
        let config = EngineConfig::for_store(dir.path(), Some(&other)).unwrap();
        assert_eq!(config.app_dir, dir.path().join("b"));
    }

    #[test]
    fn mock_backend_is_configurable() {
        let config = EngineConfig::parse("backend = \"mock\"\n").unwrap();
        assert_eq!(config.backend, "mock");
        assert_eq!(config.docker_bin, "docker");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::parse("resource = \"x\"\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn missing_explicit_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::for_store(dir.path(), Some(&dir.path().join("nope.toml")))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
