//! Configuration for the activity agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Persisted agent settings.
///
/// Host-editor identity (`editor_name`, `editor_version`) is written by the
/// editor bridge when it installs the agent; everything else is user
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Api key for the reporting backend.
    pub api_key: Option<String>,

    /// Non-default api base url, passed through to the reporting CLI.
    pub api_url: Option<String>,

    /// Location of the reporting CLI binary.
    pub cli_path: Option<PathBuf>,

    /// When set, the agent exits without processing events.
    pub disabled: bool,

    /// Verbose logging.
    pub debug: bool,

    /// Send anonymous usage metrics with each CLI invocation.
    pub metrics: bool,

    /// Whether the host editor has any AI generation surface. Drives the
    /// classifier's AI attribution fallback.
    pub ai_capabilities: bool,

    /// Host editor name, e.g. "vscode".
    pub editor_name: Option<String>,

    /// Host editor version.
    pub editor_version: Option<String>,

    /// Path for the activity log and other agent state.
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codepulse");

        Self {
            api_key: None,
            api_url: None,
            cli_path: None,
            disabled: false,
            debug: false,
            metrics: false,
            ai_capabilities: true,
            editor_name: None,
            editor_version: None,
            data_path,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codepulse")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Activity log location.
    pub fn log_path(&self) -> PathBuf {
        self.data_path.join("codepulse.log")
    }

    /// Reporting CLI location, defaulting to the data directory.
    pub fn cli_location(&self) -> PathBuf {
        self.cli_path
            .clone()
            .unwrap_or_else(|| self.data_path.join("codepulse-cli"))
    }

    /// User-agent string identifying the host editor and this agent.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} codepulse-agent/{}",
            self.editor_name.as_deref().unwrap_or("unknown-editor"),
            self.editor_version.as_deref().unwrap_or("0.0.0"),
            crate::VERSION,
        )
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("serialize error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.disabled);
        assert!(config.ai_capabilities);
        assert!(config.api_key.is_none());
        assert!(config.data_path.ends_with("codepulse"));
    }

    #[test]
    fn test_partial_config_parses_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_key": "abc", "disabled": true}"#).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert!(config.disabled);
        assert!(config.ai_capabilities);
    }

    #[test]
    fn test_user_agent_falls_back_when_editor_unknown() {
        let mut config = Config::default();
        assert!(config.user_agent().starts_with("unknown-editor/0.0.0"));
        config.editor_name = Some("vscode".to_string());
        config.editor_version = Some("1.92.0".to_string());
        assert!(config.user_agent().starts_with("vscode/1.92.0"));
    }

    #[test]
    fn test_cli_location_default_under_data_path() {
        let config = Config::default();
        assert!(config.cli_location().ends_with("codepulse-cli"));
    }
}
