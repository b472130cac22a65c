use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

/// When a released class gets an `execute_unbind` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnbindPolicy {
    /// Only classes whose bind call was actually made (successful or not)
    #[default]
    Attempted,
    /// Every released class, including ones skipped for an empty module path
    Always,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error reading config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Whether auto mixin is enabled (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Run the catch-up scan at the end of `initialize` (default: false)
    #[serde(default)]
    pub scan_on_initialize: bool,

    /// Which released classes are unbound (default: attempted)
    #[serde(default)]
    pub unbind_policy: UnbindPolicy,

    /// Log how many bindings were abandoned at shutdown (default: true)
    #[serde(default = "default_log_abandoned")]
    pub log_abandoned: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_log_abandoned() -> bool {
    true
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_on_initialize: false,
            unbind_policy: UnbindPolicy::Attempted,
            log_abandoned: true,
        }
    }
}

impl ListenerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(target: "automix", "Loaded listener config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ListenerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ListenerConfig::default());
        assert!(config.enabled);
        assert_eq!(config.unbind_policy, UnbindPolicy::Attempted);
    }

    #[test]
    fn test_parse_policy_and_flags() {
        let config = ListenerConfig::from_toml_str(
            r#"
            enabled = false
            scan_on_initialize = true
            unbind_policy = "always"
            "#,
        )
        .unwrap();

        assert!(!config.enabled);
        assert!(config.scan_on_initialize);
        assert_eq!(config.unbind_policy, UnbindPolicy::Always);
        assert!(config.log_abandoned);
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let err = ListenerConfig::from_toml_str(r#"unbind_policy = "sometimes""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scan_on_initialize = true").unwrap();

        let config = ListenerConfig::load(file.path()).unwrap();
        assert!(config.scan_on_initialize);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ListenerConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
