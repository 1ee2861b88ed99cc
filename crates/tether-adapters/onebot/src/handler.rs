//! Frame handling for OneBot peers.
//!
//! [`OneBotHandler`] is the [`ConnectionHandler`] every transport connection
//! calls into. It builds the lifecycle and heartbeat frames and routes each
//! inbound action frame:
//!
//! ```text
//! frame ──▶ ActionMessage::parse ──┬── send_* ──▶ CorrelationTable::dispatch
//!                                  ├── get_*  ──▶ canned response ──▶ peer
//!                                  └── other  ──▶ logged, dropped
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::{
    BoxedPeer, ConnectionHandler, CorrelationTable, DecodeError, Delivery, IdentityResolver,
    SettingsProvider, StatsProvider,
};
use tracing::{debug, trace, warn};

use crate::model::{ActionMessage, HeartbeatEvent, LifecycleEvent, canned_response};

/// Routes OneBot action frames into the shared correlation table.
pub struct OneBotHandler {
    settings: Arc<dyn SettingsProvider>,
    stats: Arc<dyn StatsProvider>,
    identity: Arc<dyn IdentityResolver>,
    table: Arc<CorrelationTable<ActionMessage>>,
}

impl OneBotHandler {
    /// Creates a handler over the given collaborators.
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        stats: Arc<dyn StatsProvider>,
        identity: Arc<dyn IdentityResolver>,
        table: Arc<CorrelationTable<ActionMessage>>,
    ) -> Self {
        Self {
            settings,
            stats,
            identity,
            table,
        }
    }

    /// The correlation table replies are dispatched into.
    pub fn table(&self) -> &Arc<CorrelationTable<ActionMessage>> {
        &self.table
    }

    /// The correlation key for a reply.
    ///
    /// In string-identity mode the addressed id is mapped back to the id the
    /// request originated from.
    fn correlation_key(&self, message: &ActionMessage) -> String {
        let key = message.user_key();
        if self.settings.string_identity() {
            self.identity.resolve_origin(&key)
        } else {
            key
        }
    }

    async fn answer_query(&self, peer: &BoxedPeer, message: &ActionMessage) {
        let Some(response) =
            canned_response(&message.action, &message.echo, self.settings.self_identity())
        else {
            warn!(
                peer = %peer.id(),
                error = %DecodeError::UnsupportedAction(message.action.clone()),
                "Dropping action"
            );
            return;
        };

        let value = match serde_json::to_value(&response) {
            Ok(value) => value,
            Err(e) => {
                warn!(action = %message.action, error = %e, "Failed to encode response");
                return;
            }
        };
        if let Err(e) = peer.send_message(&value).await {
            warn!(peer = %peer.id(), action = %message.action, error = %e, "Failed to send response");
        }
    }
}

#[async_trait]
impl ConnectionHandler for OneBotHandler {
    fn connect_frame(&self) -> Value {
        serde_json::to_value(LifecycleEvent::connect(self.settings.self_identity()))
            .unwrap_or_default()
    }

    fn heartbeat_frame(&self, interval: Duration) -> Value {
        let event = HeartbeatEvent::new(
            self.settings.self_identity(),
            interval.as_millis() as u64,
            self.stats.counters(),
        );
        serde_json::to_value(event).unwrap_or_default()
    }

    async fn on_frame(&self, peer: BoxedPeer, data: Vec<u8>) {
        let message = match ActionMessage::parse(&data) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %peer.id(), error = %DecodeError::from(e), "Dropping frame");
                return;
            }
        };
        trace!(peer = %peer.id(), "Received {}", message.log_summary());

        if !message.is_send() {
            self.answer_query(&peer, &message).await;
            return;
        }

        let key = self.correlation_key(&message);
        match self.table.dispatch(&key, message) {
            Delivery::Delivered => debug!(key = %key, "Reply delivered to waiter"),
            Delivery::Buffered => debug!(key = %key, "Reply buffered"),
            Delivery::Discarded => warn!(key = %key, "Pending buffer full, reply dropped"),
        }
    }
}
