//! Fan-out of one outbound frame to every live peer.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::DispatchError;
use crate::peer::BoxedPeer;

/// How [`Dispatcher::send`] treats per-target results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchMode {
    /// Wait for every target and aggregate failures.
    #[default]
    Wait,
    /// Start every send and return at once; errors are only logged.
    FireAndForget,
}

/// Sends frames to a set of peers concurrently, one task per target.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new() -> Self {
        Self
    }

    /// Sends `message` to every target.
    ///
    /// In [`DispatchMode::Wait`] all targets are attempted even when some
    /// fail, and the returned error lists every failure.
    pub async fn send(
        &self,
        message: &Value,
        targets: &[BoxedPeer],
        mode: DispatchMode,
    ) -> Result<(), DispatchError> {
        let message = Arc::new(message.clone());
        trace!(targets = targets.len(), ?mode, "Broadcasting frame");

        let tasks: Vec<_> = targets
            .iter()
            .map(|peer| {
                let peer = Arc::clone(peer);
                let message = Arc::clone(&message);
                tokio::spawn(async move {
                    peer.send_message(&message)
                        .await
                        .map_err(|e| format!("error sending message via {}: {e}", peer.id()))
                })
            })
            .collect();

        if mode == DispatchMode::FireAndForget {
            tokio::spawn(async move {
                for result in join_all(tasks).await {
                    if let Ok(Err(e)) = result {
                        debug!(error = %e, "Fire-and-forget send failed");
                    }
                }
            });
            return Ok(());
        }

        let failures: Vec<String> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(e) => Some(format!("send task failed: {e}")),
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError { failures })
        }
    }
}
