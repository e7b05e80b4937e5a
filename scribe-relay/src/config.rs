//! Configuration resolution for scribe-relay
//!
//! Provides ENV → TOML → compiled-default resolution per value, in the
//! same three-tier shape the rest of the service's knobs use. Secrets
//! (client credentials, API keys) have no compiled default and fail
//! resolution with a hint listing every way to supply them.

use scribe_common::config::{config_file_path, load_toml_config, TomlConfig};
use scribe_common::{Error, Result};
use std::path::Path;
use tracing::warn;

/// Upstream credential endpoint configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth token endpoint (client-credentials exchange)
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub account_id: String,
}

/// Streaming connection configuration
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Websocket endpoint of the meeting platform's event stream
    pub endpoint: String,
    /// Event subscription to attach to
    pub subscription_id: String,
    /// Liveness probe interval, seconds
    pub heartbeat_secs: u64,
    /// Reconnect attempts before the circuit opens permanently
    pub max_reconnect_attempts: u32,
    /// First reconnect delay, milliseconds
    pub base_delay_ms: u64,
    /// Reconnect delay ceiling, milliseconds
    pub max_delay_ms: u64,
}

/// Rate-limited dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Sliding window span, seconds
    pub window_secs: u64,
    /// Request ceiling inside one window
    pub max_requests: usize,
    /// Retries after a throttled failure
    pub max_retries: u32,
    /// Base retry delay, milliseconds (scales linearly with attempt)
    pub retry_delay_ms: u64,
}

/// Task board API configuration
#[derive(Debug, Clone)]
pub struct BoardSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_token: String,
    /// List that receives per-character cards
    pub list_id: String,
}

/// Extraction service configuration
///
/// The transcription/interpretation pair is optional: without it the
/// fallback chain runs with the pattern strategy only.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub transcriber_url: Option<String>,
    pub transcriber_key: Option<String>,
    pub interpreter_url: Option<String>,
    pub interpreter_key: Option<String>,
    pub interpreter_model: String,
    /// Project assigned to facts that name none
    pub default_project: String,
    /// Pacing between follow-up dispatches for one character, milliseconds
    pub inter_task_delay_ms: u64,
    /// Pacing between character groups, milliseconds
    pub inter_group_delay_ms: u64,
}

/// Complete relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub auth: AuthConfig,
    pub stream: StreamSettings,
    pub dispatcher: DispatcherSettings,
    pub board: BoardSettings,
    pub extraction: ExtractionSettings,
}

impl RelayConfig {
    /// Load and resolve configuration
    ///
    /// `config_path` is the optional command-line override for the TOML
    /// file location.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_file_path(config_path);
        let toml = load_toml_config(&path)?;
        Self::resolve(&toml)
    }

    /// Resolve each value: ENV → TOML → compiled default
    pub fn resolve(toml: &TomlConfig) -> Result<Self> {
        let auth = AuthConfig {
            token_url: string_with_default(
                "SCRIBE_TOKEN_URL",
                toml.auth.token_url.as_deref(),
                "https://zoom.us/oauth/token",
            ),
            client_id: required(
                "client id",
                string_tier("SCRIBE_CLIENT_ID", toml.auth.client_id.as_deref()),
                "SCRIBE_CLIENT_ID or [auth] client_id",
            )?,
            client_secret: required(
                "client secret",
                string_tier("SCRIBE_CLIENT_SECRET", toml.auth.client_secret.as_deref()),
                "SCRIBE_CLIENT_SECRET or [auth] client_secret",
            )?,
            account_id: required(
                "account id",
                string_tier("SCRIBE_ACCOUNT_ID", toml.auth.account_id.as_deref()),
                "SCRIBE_ACCOUNT_ID or [auth] account_id",
            )?,
        };

        let stream = StreamSettings {
            endpoint: string_with_default(
                "SCRIBE_STREAM_ENDPOINT",
                toml.stream.endpoint.as_deref(),
                "wss://ws.zoom.us/ws",
            ),
            subscription_id: required(
                "stream subscription id",
                string_tier("SCRIBE_SUBSCRIPTION_ID", toml.stream.subscription_id.as_deref()),
                "SCRIBE_SUBSCRIPTION_ID or [stream] subscription_id",
            )?,
            heartbeat_secs: u64_tier("SCRIBE_HEARTBEAT_SECS", toml.stream.heartbeat_secs, 30),
            max_reconnect_attempts: u64_tier(
                "SCRIBE_MAX_RECONNECT_ATTEMPTS",
                toml.stream.max_reconnect_attempts.map(u64::from),
                10,
            ) as u32,
            base_delay_ms: u64_tier("SCRIBE_BASE_DELAY_MS", toml.stream.base_delay_ms, 1000),
            max_delay_ms: u64_tier("SCRIBE_MAX_DELAY_MS", toml.stream.max_delay_ms, 60_000),
        };

        let dispatcher = DispatcherSettings {
            window_secs: u64_tier("SCRIBE_WINDOW_SECS", toml.dispatcher.window_secs, 10),
            max_requests: u64_tier(
                "SCRIBE_MAX_REQUESTS",
                toml.dispatcher.max_requests.map(|v| v as u64),
                10,
            ) as usize,
            max_retries: u64_tier(
                "SCRIBE_MAX_RETRIES",
                toml.dispatcher.max_retries.map(u64::from),
                3,
            ) as u32,
            retry_delay_ms: u64_tier("SCRIBE_RETRY_DELAY_MS", toml.dispatcher.retry_delay_ms, 2000),
        };

        let board = BoardSettings {
            base_url: string_with_default(
                "SCRIBE_BOARD_URL",
                toml.board.base_url.as_deref(),
                "https://api.trello.com/1",
            ),
            api_key: required(
                "board API key",
                string_tier("SCRIBE_BOARD_KEY", toml.board.api_key.as_deref()),
                "SCRIBE_BOARD_KEY or [board] api_key",
            )?,
            api_token: required(
                "board API token",
                string_tier("SCRIBE_BOARD_TOKEN", toml.board.api_token.as_deref()),
                "SCRIBE_BOARD_TOKEN or [board] api_token",
            )?,
            list_id: required(
                "board list id",
                string_tier("SCRIBE_BOARD_LIST", toml.board.list_id.as_deref()),
                "SCRIBE_BOARD_LIST or [board] list_id",
            )?,
        };

        let extraction = ExtractionSettings {
            transcriber_url: string_tier("SCRIBE_TRANSCRIBER_URL", toml.extraction.transcriber_url.as_deref()),
            transcriber_key: string_tier("SCRIBE_TRANSCRIBER_KEY", toml.extraction.transcriber_key.as_deref()),
            interpreter_url: string_tier("SCRIBE_INTERPRETER_URL", toml.extraction.interpreter_url.as_deref()),
            interpreter_key: string_tier("SCRIBE_INTERPRETER_KEY", toml.extraction.interpreter_key.as_deref()),
            interpreter_model: string_with_default(
                "SCRIBE_INTERPRETER_MODEL",
                toml.extraction.interpreter_model.as_deref(),
                "gpt-4o-mini",
            ),
            default_project: string_with_default(
                "SCRIBE_DEFAULT_PROJECT",
                toml.extraction.default_project.as_deref(),
                "Campaign",
            ),
            inter_task_delay_ms: u64_tier(
                "SCRIBE_INTER_TASK_DELAY_MS",
                toml.extraction.inter_task_delay_ms,
                1500,
            ),
            inter_group_delay_ms: u64_tier(
                "SCRIBE_INTER_GROUP_DELAY_MS",
                toml.extraction.inter_group_delay_ms,
                3000,
            ),
        };

        Ok(RelayConfig {
            auth,
            stream,
            dispatcher,
            board,
            extraction,
        })
    }
}

/// Resolve one optional string value: ENV → TOML
fn string_tier(env_key: &str, toml_value: Option<&str>) -> Option<String> {
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    if let Some(value) = toml_value {
        if !value.trim().is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// Resolve one string value with a compiled default: ENV → TOML → default
fn string_with_default(env_key: &str, toml_value: Option<&str>, default: &str) -> String {
    string_tier(env_key, toml_value).unwrap_or_else(|| default.to_string())
}

/// Resolve one numeric value: ENV → TOML → default
///
/// An unparseable ENV override is ignored with a warning rather than
/// killing startup.
fn u64_tier(env_key: &str, toml_value: Option<u64>, default: u64) -> u64 {
    if let Ok(raw) = std::env::var(env_key) {
        match raw.trim().parse() {
            Ok(value) => return value,
            Err(_) => warn!(
                env = env_key,
                value = %raw,
                "Ignoring unparseable numeric environment override"
            ),
        }
    }
    toml_value.unwrap_or(default)
}

fn required(name: &str, value: Option<String>, hint: &str) -> Result<String> {
    value.ok_or_else(|| {
        Error::Config(format!(
            "{} not configured. Supply it via {} (environment variable or TOML config file)",
            name, hint
        ))
    })
}
