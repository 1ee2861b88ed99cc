//! Narrow interfaces to the bridge's external collaborators.
//!
//! The connection and correlation engine never reads configuration files,
//! counters stores or id-mapping databases directly; it asks these traits.

use serde::{Deserialize, Serialize};

/// Read-only view of the peer-facing configuration.
pub trait SettingsProvider: Send + Sync {
    /// Addresses of the peers to dial.
    fn peer_addresses(&self) -> Vec<String>;

    /// Bearer tokens, positionally matched against [`peer_addresses`](Self::peer_addresses).
    fn peer_tokens(&self) -> Vec<String>;

    /// Dial attempts allowed when re-establishing a dropped connection.
    fn max_reconnect_retries(&self) -> u32;

    /// Heartbeat period in seconds.
    fn heartbeat_interval_secs(&self) -> u64;

    /// Dial attempts allowed for the first connection at startup.
    fn launch_retries(&self) -> u32;

    /// How long a request waits for its reply, in seconds.
    fn request_timeout_secs(&self) -> u64;

    /// The bot identity announced to peers.
    fn self_identity(&self) -> i64;

    /// When set, failed writes are dropped instead of queued for resend.
    fn error_buffering_disabled(&self) -> bool;

    /// Encode identities as strings instead of integers.
    fn string_identity(&self) -> bool;

    /// Encode message content as segment arrays instead of plain text.
    fn array_content(&self) -> bool;

    /// Emit plain OneBot frames without the extended `real_*` fields.
    fn native_mode(&self) -> bool {
        false
    }
}

/// Message counters reported in heartbeat frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Messages received from peers.
    pub message_received: u64,
    /// Messages sent to peers.
    pub message_sent: u64,
    /// Unix time of the most recent message, in seconds.
    pub last_message_time: i64,
}

/// Source of heartbeat statistics.
pub trait StatsProvider: Send + Sync {
    /// Returns the current counters.
    fn counters(&self) -> Counters;
}

/// Maps the identity a peer addresses to the identity it originated from.
pub trait IdentityResolver: Send + Sync {
    /// Resolves `active` to its origin identity.
    fn resolve_origin(&self, active: &str) -> String;
}

/// Identity resolver that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughIdentity;

impl IdentityResolver for PassthroughIdentity {
    fn resolve_origin(&self, active: &str) -> String {
        active.to_string()
    }
}
