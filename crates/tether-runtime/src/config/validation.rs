//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LoggingConfig, LogOutput, Settings, TetherConfig, WsServerConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TetherConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bridge_settings(&config.bridge)?;
    if config.server.enabled {
        validate_server_config(&config.server)?;
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::invalid("log filter module names cannot be empty"));
    }
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::invalid("file log output requires logging.file_path"));
    }
    Ok(())
}

fn validate_bridge_settings(settings: &Settings) -> ConfigResult<()> {
    for url in &settings.peer_addresses {
        validate_ws_url(url)?;
    }

    if settings.peer_tokens.len() > settings.peer_addresses.len() {
        return Err(ConfigError::TokenMismatch {
            tokens: settings.peer_tokens.len(),
            peers: settings.peer_addresses.len(),
        });
    }

    if settings.heartbeat_interval_secs == 0 {
        return Err(ConfigError::ZeroInterval("bridge.heart_beat_interval"));
    }

    if settings.request_timeout_secs == 0 {
        return Err(ConfigError::ZeroInterval("bridge.timeout"));
    }

    Ok(())
}

fn validate_server_config(server: &WsServerConfig) -> ConfigResult<()> {
    if server.port == 0 {
        return Err(ConfigError::InvalidPort(server.port));
    }
    if !server.path.starts_with('/') {
        return Err(ConfigError::invalid("server.path must start with '/'"));
    }
    Ok(())
}

fn validate_ws_url(url: &str) -> ConfigResult<()> {
    const SCHEMES: [&str; 2] = ["ws://", "wss://"];

    if !SCHEMES.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::InvalidPeerUrl {
            url: url.to_string(),
            reason: format!("scheme must be one of {SCHEMES:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&TetherConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_peer_url_scheme() {
        let mut config = TetherConfig::default();
        config.bridge.peer_addresses = vec!["http://127.0.0.1:6700".into()];

        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::InvalidPeerUrl { .. })));
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = TetherConfig::default();
        config.bridge.heartbeat_interval_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = TetherConfig::default();
        config.bridge.request_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_server_only_when_enabled() {
        let mut config = TetherConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_ok());

        config.server.enabled = true;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort(0))
        ));

        config.server.port = 8080;
        config.server.path = "ws".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = TetherConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("tether.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
