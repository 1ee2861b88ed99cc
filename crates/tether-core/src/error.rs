//! Unified error types for the Tether core.
//!
//! Transport, correlation and dispatch failures each get their own enum so
//! callers can tell a dead peer apart from a reply that never arrived.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A single connection attempt failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Every dial attempt failed; the peer stays closed until dialed again.
    #[error("gave up connecting to {url} after {attempts} attempt(s): {reason}")]
    RetriesExhausted {
        /// The URL that failed to connect.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Reason reported by the last attempt.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SendFailed(format!("failed to serialize frame: {err}"))
    }
}

// =============================================================================
// Correlation Errors
// =============================================================================

/// Errors returned while waiting on a correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    /// No message arrived for the key before the deadline.
    #[error("timeout waiting for message with key {key} after {timeout:?}")]
    Timeout {
        /// The key that was waited on.
        key: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// A newer wait on the same key replaced this one.
    #[error("wait for key {key} was superseded by a newer registration")]
    Superseded {
        /// The key that was waited on.
        key: String,
    },
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Aggregated failure of a broadcast in wait mode.
///
/// Holds one entry per target that failed; the display form joins them
/// with `"; "`.
#[derive(Debug, Clone, Error)]
#[error("{}", .failures.join("; "))]
pub struct DispatchError {
    /// Individual failure messages, one per failed target.
    pub failures: Vec<String>,
}

impl DispatchError {
    /// Number of targets that failed.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// A peer frame that could not be understood.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame was not valid JSON for the expected shape.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame named an action with no known response.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for correlation waits.
pub type CorrelationResult<T> = Result<T, CorrelationError>;

/// Result type for frame decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_joins_failures() {
        let err = DispatchError {
            failures: vec!["peer a: closed".into(), "peer b: timeout".into()],
        };
        assert_eq!(err.to_string(), "peer a: closed; peer b: timeout");
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn test_timeout_error_names_key() {
        let err = CorrelationError::Timeout {
            key: "u1".into(),
            timeout: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("u1"));
    }
}
