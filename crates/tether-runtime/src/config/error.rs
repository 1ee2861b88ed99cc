//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a [`TetherConfig`](super::TetherConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension has no enabled format feature.
    #[error("Unsupported or disabled configuration format: .{0}")]
    UnsupportedFormat(String),

    /// Figment could not merge or deserialize the sources.
    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("Invalid peer address {url}: {reason}")]
    InvalidPeerUrl { url: String, reason: String },

    /// More tokens than peer addresses; tokens pair with addresses by index.
    #[error("{tokens} token(s) configured for {peers} peer address(es)")]
    TokenMismatch { tokens: usize, peers: usize },

    #[error("{0} must be greater than 0")]
    ZeroInterval(&'static str),

    #[error("Invalid port number: {0}")]
    InvalidPort(u16),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Extract(Box::new(error))
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
