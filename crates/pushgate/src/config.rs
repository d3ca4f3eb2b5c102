//! Gateway configuration file.

use std::path::{Path, PathBuf};

use pushgate_script::{PluginRegistry, RecordError};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level YAML configuration.
///
/// ```yaml
/// listen: 0.0.0.0:8080
/// plugin_path: ./plugins
/// webhooks:
///   - name: github
///     file: github.lua
///     env:
///       secret: s3cr3t
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen: String,
    /// Base directory for relative plugin `file` paths.
    pub plugin_path: Option<PathBuf>,
    pub max_body_size: usize,
    /// Compile every plugin at startup instead of on first request.
    pub warm_plugins: bool,
    /// Raw records; each is validated on its own when the registry is built.
    pub webhooks: Vec<serde_yaml::Value>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            plugin_path: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            warm_plugins: false,
            webhooks: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load a config file. `plugin_path` defaults to, and relative values
    /// resolve against, the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        let config_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.plugin_path = Some(match config.plugin_path.take() {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        });

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the plugin registry, returning the records that were skipped.
    pub fn build_registry(&self) -> (PluginRegistry, Vec<RecordError>) {
        PluginRegistry::from_records(&self.webhooks, self.plugin_path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_file() {
        let config = GatewayConfig::from_yaml("{}").unwrap();
        assert_eq!(config.listen, DEFAULT_LISTEN);
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert!(!config.warm_plugins);
        assert!(config.webhooks.is_empty());
    }

    #[test]
    fn bad_records_do_not_fail_parsing() {
        let config = GatewayConfig::from_yaml(
            r#"
webhooks:
  - name: ok
    script: "return 200"
  - file: nameless.lua
  - 42
"#,
        )
        .unwrap();
        assert_eq!(config.webhooks.len(), 3);

        let (registry, errors) = config.build_registry();
        assert_eq!(registry.names(), vec!["ok".to_string()]);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn plugin_path_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pushgate.yaml");
        std::fs::write(&path, "plugin_path: scripts\n").unwrap();

        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.plugin_path, Some(dir.path().join("scripts")));
    }

    #[test]
    fn plugin_path_defaults_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pushgate.yaml");
        std::fs::write(&path, "listen: 127.0.0.1:9000\n").unwrap();

        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.plugin_path.as_deref(), Some(dir.path()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = GatewayConfig::load(Path::new("/nonexistent/pushgate.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
