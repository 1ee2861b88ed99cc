//! Peer handles and the protocol hooks a transport calls into.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportResult;

// =============================================================================
// Peer
// =============================================================================

/// Something a JSON frame can be written to.
///
/// Implemented by dialed connections and by handles for peers that dialed in,
/// so a broadcast can treat both the same way.
#[async_trait]
pub trait Peer: Send + Sync {
    /// A stable identifier for logs and error messages.
    fn id(&self) -> &str;

    /// Queues `message` for delivery to this peer.
    async fn send_message(&self, message: &Value) -> TransportResult<()>;
}

/// Shared peer handle.
pub type BoxedPeer = Arc<dyn Peer>;

// =============================================================================
// Connection Handler
// =============================================================================

/// Protocol hooks invoked by a transport connection.
///
/// The transport owns sockets and tasks; the handler owns what goes over
/// them.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Frame sent as soon as a socket is established.
    fn connect_frame(&self) -> Value;

    /// Frame sent on every heartbeat tick.
    fn heartbeat_frame(&self, interval: Duration) -> Value;

    /// Handles one frame read from `peer`.
    ///
    /// Called from a short-lived task; replies go back through `peer`.
    async fn on_frame(&self, peer: BoxedPeer, data: Vec<u8>);
}

/// Shared connection handler.
pub type BoxedConnectionHandler = Arc<dyn ConnectionHandler>;
