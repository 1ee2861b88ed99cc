//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tether_core::{DispatchMode, SettingsProvider};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Peer-facing bridge settings.
    #[serde(default)]
    pub bridge: Settings,

    /// Inbound websocket server.
    #[serde(default)]
    pub server: WsServerConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The lowercase directive name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level, used when `RUST_LOG` is unset.
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file for [`LogOutput::File`].
    pub file_path: Option<PathBuf>,
    /// Per-module levels, e.g. `tether_transport = "debug"`.
    pub filters: HashMap<String, LogLevel>,
    /// Include thread ids.
    pub thread_ids: bool,
    /// Include file and line.
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            filters: HashMap::new(),
            thread_ids: false,
            file_location: false,
        }
    }
}

// =============================================================================
// Bridge settings
// =============================================================================

/// Peer-facing bridge settings.
///
/// Field names on the wire follow the established OneBot bridge config keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Peer websocket URLs to dial.
    #[serde(rename = "ws_address")]
    pub peer_addresses: Vec<String>,

    /// Tokens, matched to `ws_address` by position.
    #[serde(rename = "ws_token")]
    pub peer_tokens: Vec<String>,

    /// Dial attempts when re-establishing a dropped connection.
    #[serde(rename = "reconnect_times")]
    pub reconnect_retries: u32,

    /// Heartbeat period in seconds.
    #[serde(rename = "heart_beat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Dial attempts for the first connection.
    #[serde(rename = "launch_reconnect_times")]
    pub launch_retries: u32,

    /// Bot identity announced to peers.
    #[serde(rename = "uin")]
    pub self_id: i64,

    /// Drop failed writes instead of resending them on the next heartbeat.
    #[serde(rename = "disable_error_chan")]
    pub disable_error_buffer: bool,

    /// Encode ids as strings.
    #[serde(rename = "string_ob11")]
    pub string_identity: bool,

    /// Encode message content as segment arrays.
    #[serde(rename = "array")]
    pub array_content: bool,

    /// Omit the extended `real_*` event fields.
    #[serde(rename = "native_ob11")]
    pub native: bool,

    /// Reply timeout in seconds.
    #[serde(rename = "timeout")]
    pub request_timeout_secs: u64,

    /// Payload used when a request arrives empty.
    pub default_payload: String,

    /// Whether broadcasts wait for every peer.
    pub broadcast_mode: DispatchMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            peer_addresses: Vec::new(),
            peer_tokens: Vec::new(),
            reconnect_retries: 100,
            heartbeat_interval_secs: 5,
            launch_retries: 1,
            self_id: 0,
            disable_error_buffer: false,
            string_identity: false,
            array_content: false,
            native: false,
            request_timeout_secs: 4,
            default_payload: "帮助".to_string(),
            broadcast_mode: DispatchMode::Wait,
        }
    }
}

impl Settings {
    /// Config keys whose change only takes effect after reconnecting.
    pub fn restart_required_fields() -> &'static [&'static str] {
        &[
            "ws_address",
            "ws_token",
            "reconnect_times",
            "launch_reconnect_times",
            "heart_beat_interval",
        ]
    }

    /// The restart-requiring keys whose values differ between `self` and `other`.
    pub fn changed_restart_fields(&self, other: &Settings) -> Vec<&'static str> {
        let changed = [
            self.peer_addresses != other.peer_addresses,
            self.peer_tokens != other.peer_tokens,
            self.reconnect_retries != other.reconnect_retries,
            self.launch_retries != other.launch_retries,
            self.heartbeat_interval_secs != other.heartbeat_interval_secs,
        ];
        Self::restart_required_fields()
            .iter()
            .zip(changed)
            .filter_map(|(field, changed)| changed.then_some(*field))
            .collect()
    }
}

impl SettingsProvider for Settings {
    fn peer_addresses(&self) -> Vec<String> {
        self.peer_addresses.clone()
    }

    fn peer_tokens(&self) -> Vec<String> {
        self.peer_tokens.clone()
    }

    fn max_reconnect_retries(&self) -> u32 {
        self.reconnect_retries
    }

    fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs
    }

    fn launch_retries(&self) -> u32 {
        self.launch_retries
    }

    fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
    }

    fn self_identity(&self) -> i64 {
        self.self_id
    }

    fn error_buffering_disabled(&self) -> bool {
        self.disable_error_buffer
    }

    fn string_identity(&self) -> bool {
        self.string_identity
    }

    fn array_content(&self) -> bool {
        self.array_content
    }

    fn native_mode(&self) -> bool {
        self.native
    }
}

// =============================================================================
// Inbound server
// =============================================================================

/// Inbound websocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsServerConfig {
    /// Whether peers may dial in.
    pub enabled: bool,

    /// Host address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Path for the websocket endpoint.
    pub path: String,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "0.0.0.0".to_string(),
            port: 8080,
            path: "/ws".to_string(),
        }
    }
}

impl WsServerConfig {
    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
logging:
  level: debug
  filters:
    tether_transport: trace
bridge:
  ws_address: ["ws://127.0.0.1:6700", "wss://bot.example.com/ws"]
  ws_token: ["secret"]
  reconnect_times: 10
  heart_beat_interval: 15
  uin: 2022717137
  string_ob11: true
  array: true
  timeout: 8
  broadcast_mode: fire-and-forget
server:
  enabled: true
  port: 9000
"#;

    #[test]
    fn test_yaml_fixture() {
        let config: TetherConfig = serde_yaml::from_str(FIXTURE).unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.filters["tether_transport"], LogLevel::Trace);
        assert_eq!(config.bridge.peer_addresses.len(), 2);
        assert_eq!(config.bridge.peer_tokens, vec!["secret".to_string()]);
        assert_eq!(config.bridge.reconnect_retries, 10);
        assert_eq!(config.bridge.heartbeat_interval_secs, 15);
        assert_eq!(config.bridge.self_id, 2022717137);
        assert!(config.bridge.string_identity);
        assert!(config.bridge.array_content);
        assert_eq!(config.bridge.request_timeout_secs, 8);
        assert_eq!(config.bridge.broadcast_mode, DispatchMode::FireAndForget);
        assert_eq!(config.bridge.launch_retries, 1);
        assert_eq!(config.bridge.default_payload, "帮助");
        assert!(config.server.enabled);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_settings_provider() {
        let settings = Settings {
            self_id: 42,
            disable_error_buffer: true,
            ..Default::default()
        };
        let provider: &dyn SettingsProvider = &settings;

        assert_eq!(provider.self_identity(), 42);
        assert_eq!(provider.max_reconnect_retries(), 100);
        assert_eq!(provider.heartbeat_interval_secs(), 5);
        assert_eq!(provider.request_timeout_secs(), 4);
        assert!(provider.error_buffering_disabled());
        assert!(!provider.native_mode());
    }

    #[test]
    fn test_changed_restart_fields() {
        let before = Settings::default();
        let after = Settings {
            peer_addresses: vec!["ws://x".into()],
            heartbeat_interval_secs: 30,
            request_timeout_secs: 10,
            ..Default::default()
        };

        assert_eq!(
            before.changed_restart_fields(&after),
            vec!["ws_address", "heart_beat_interval"]
        );
        assert!(before.changed_restart_fields(&before.clone()).is_empty());
    }
}
