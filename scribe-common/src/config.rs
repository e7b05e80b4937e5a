//! Configuration file loading and path resolution
//!
//! TOML file location priority:
//! 1. Explicit path (command-line argument, highest priority)
//! 2. `SCRIBE_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/scribe/scribe.toml` on Linux)
//!
//! A missing config file never terminates the service: every value has an
//! ENV override and a compiled default, so the file is one tier of three.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents
///
/// Every field is optional; resolution against ENV overrides and compiled
/// defaults happens in the consuming service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Upstream credential endpoint settings
    #[serde(default)]
    pub auth: AuthToml,
    /// Streaming connection settings
    #[serde(default)]
    pub stream: StreamToml,
    /// Rate-limited dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherToml,
    /// Task board API settings
    #[serde(default)]
    pub board: BoardToml,
    /// Extraction service settings
    #[serde(default)]
    pub extraction: ExtractionToml,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthToml {
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StreamToml {
    pub endpoint: Option<String>,
    pub subscription_id: Option<String>,
    pub heartbeat_secs: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DispatcherToml {
    pub window_secs: Option<u64>,
    pub max_requests: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BoardToml {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_token: Option<String>,
    pub list_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractionToml {
    pub transcriber_url: Option<String>,
    pub transcriber_key: Option<String>,
    pub interpreter_url: Option<String>,
    pub interpreter_key: Option<String>,
    pub interpreter_model: Option<String>,
    pub default_project: Option<String>,
    pub inter_task_delay_ms: Option<u64>,
    pub inter_group_delay_ms: Option<u64>,
}

/// Resolve the config file path
///
/// Priority: explicit argument → `SCRIBE_CONFIG` → platform default.
pub fn config_file_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var("SCRIBE_CONFIG") {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .map(|d| d.join("scribe").join("scribe.toml"))
        .unwrap_or_else(|| PathBuf::from("scribe.toml"))
}

/// Load the TOML config file
///
/// A missing file yields defaults with a warning; an unparseable file is a
/// hard configuration error (a present-but-broken config is worth failing
/// loudly over, silence would mask typos in credentials).
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "Config file not found, using environment variables and defaults"
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_toml_config(Path::new("/nonexistent/scribe.toml")).unwrap();
        assert!(config.stream.endpoint.is_none());
        assert!(config.auth.client_id.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scribe.toml");
        std::fs::write(
            &path,
            r#"
[stream]
endpoint = "wss://stream.example.com/events"
max_reconnect_attempts = 5

[dispatcher]
max_requests = 8
"#,
        )
        .unwrap();

        let config = load_toml_config(&path).unwrap();
        assert_eq!(
            config.stream.endpoint.as_deref(),
            Some("wss://stream.example.com/events")
        );
        assert_eq!(config.stream.max_reconnect_attempts, Some(5));
        assert_eq!(config.dispatcher.max_requests, Some(8));
        // Unspecified sections fall back to empty defaults
        assert!(config.board.api_key.is_none());
    }

    #[test]
    fn test_broken_config_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scribe.toml");
        std::fs::write(&path, "[stream\nendpoint = ").unwrap();

        let result = load_toml_config(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = PathBuf::from("/etc/scribe/custom.toml");
        assert_eq!(config_file_path(Some(&explicit)), explicit);
    }
}
