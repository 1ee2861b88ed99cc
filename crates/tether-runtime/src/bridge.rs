//! Request/response bridge over the peer connections.
//!
//! [`Bridge::call`] turns one request into a broadcast message event and
//! blocks until some peer answers on the request's correlation key.
//!
//! ```text
//! ToolRequest ─▶ register(user_id) ─▶ broadcast event ─▶ peers
//!                      │                                  │
//!  ToolReply ◀─ classify ◀─ Waiter::recv ◀── dispatch ◀──┘
//! ```

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tether_adapter_onebot::{ActionMessage, EventEncoding, ImagePolicy, MessageEvent};
use tether_core::{BoxedPeer, CorrelationTable, Dispatcher, HISTORY_SEPARATOR};
#[cfg(feature = "ws-server")]
use tether_transport::InboundPeers;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::stats::MemoryStats;

/// Reply text used when no peer answered in time.
pub const TIMEOUT_REPLY: &str = "等待超时";

static AT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[CQ:at,qq=\d+\]").expect("valid regex"));

static IMAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[CQ:image,file=(https?://.+?)\]").expect("valid regex"));

static RECORD_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[CQ:record,file=(https?://.+?)\]").expect("valid regex"));

/// One request from the agent-facing boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Text forwarded to the peers; empty means the configured default.
    #[serde(default)]
    pub payload: String,
    /// Requesting user, also the correlation key.
    pub user_id: String,
    /// Group the request came from; absent for private requests.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Overrides the configured reply timeout.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ToolRequest {
    /// A group request.
    pub fn group(
        payload: impl Into<String>,
        user_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            payload: payload.into(),
            user_id: user_id.into(),
            group_id: Some(group_id.into()),
            timeout: None,
        }
    }

    /// A private request.
    pub fn private(payload: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            user_id: user_id.into(),
            group_id: None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A classified peer reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolReply {
    /// Plain text, with buffered history prepended.
    Text { text: String },
    /// An image with the text around it as caption.
    Image { caption: String, url: String },
    /// A voice clip.
    Voice { url: String },
}

impl ToolReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Sends requests to every peer and waits for the correlated reply.
pub struct Bridge {
    settings: Arc<Settings>,
    table: Arc<CorrelationTable<ActionMessage>>,
    stats: Arc<MemoryStats>,
    dispatcher: Dispatcher,
    outbound: Vec<BoxedPeer>,
    #[cfg(feature = "ws-server")]
    inbound: Option<Arc<InboundPeers>>,
}

impl Bridge {
    /// Creates a bridge over the dialed peers.
    pub fn new(
        settings: Arc<Settings>,
        table: Arc<CorrelationTable<ActionMessage>>,
        stats: Arc<MemoryStats>,
        outbound: Vec<BoxedPeer>,
    ) -> Self {
        Self {
            settings,
            table,
            stats,
            dispatcher: Dispatcher::new(),
            outbound,
            #[cfg(feature = "ws-server")]
            inbound: None,
        }
    }

    /// Also broadcasts to peers that dialed in.
    #[cfg(feature = "ws-server")]
    pub fn with_inbound(mut self, inbound: Arc<InboundPeers>) -> Self {
        self.inbound = Some(inbound);
        self
    }

    /// Every peer a broadcast goes to right now.
    pub fn targets(&self) -> Vec<BoxedPeer> {
        #[allow(unused_mut)]
        let mut targets = self.outbound.clone();
        #[cfg(feature = "ws-server")]
        if let Some(inbound) = &self.inbound {
            targets.extend(inbound.snapshot());
        }
        targets
    }

    /// Counters shared with the heartbeat frames.
    pub fn stats(&self) -> &Arc<MemoryStats> {
        &self.stats
    }

    /// Forwards `request` to the peers and returns the classified reply.
    ///
    /// Never fails: a missing reply degrades to [`TIMEOUT_REPLY`].
    pub async fn call(&self, request: ToolRequest) -> ToolReply {
        let payload = if request.payload.is_empty() {
            self.settings.default_payload.clone()
        } else {
            request.payload
        };
        info!(user_id = %request.user_id, payload = %payload, "Received request");

        let waiter = self.table.register(request.user_id.clone());

        let encoding = EventEncoding::from_settings(self.settings.as_ref());
        let self_id = self.settings.self_id;
        let event = match request.group_id.as_deref().filter(|g| !g.is_empty()) {
            Some(group_id) => {
                MessageEvent::group(&payload, &request.user_id, group_id, self_id, encoding)
            }
            None => MessageEvent::private(&payload, &request.user_id, self_id, encoding),
        };
        self.broadcast(&event).await;

        let timeout = request
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.settings.request_timeout_secs));
        let reply = match waiter.recv(timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "No reply from peers");
                return ToolReply::text(TIMEOUT_REPLY);
            }
        };
        self.stats.record_received();

        match classify(&reply.content_text(ImagePolicy::Inline)) {
            ToolReply::Text { text } => ToolReply::Text {
                text: self.with_history(&request.user_id, text),
            },
            other => other,
        }
    }

    async fn broadcast(&self, event: &MessageEvent) {
        let frame = match serde_json::to_value(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode message event");
                return;
            }
        };

        let targets = self.targets();
        if targets.is_empty() {
            warn!("No peers connected, request will not be answered");
            return;
        }

        if let Err(e) = self
            .dispatcher
            .send(&frame, &targets, self.settings.broadcast_mode)
            .await
        {
            warn!(error = %e, "Broadcast failed for some peers");
        }
        self.stats.record_sent();
    }

    /// Prepends buffered replies for `key` that still fit the content budget.
    fn with_history(&self, key: &str, reply: String) -> String {
        let (history, total) = self.table.drain_pending(key, true, reply.len());
        if !history.is_empty() {
            debug!(key = %key, entries = history.len(), total, "Prepending buffered replies");
        }
        history.iter().fold(reply, |acc, message| {
            format!(
                "{}\n{HISTORY_SEPARATOR}\n{acc}",
                message.content_text(ImagePolicy::Strip)
            )
        })
    }
}

/// Sorts canonical reply text into text, image or voice.
pub fn classify(text: &str) -> ToolReply {
    if let Some(url) = IMAGE_TAG.captures(text).map(|c| c[1].to_string()) {
        let caption = IMAGE_TAG.replace_all(text, "").into_owned();
        return ToolReply::Image { caption, url };
    }

    let records: Vec<String> = RECORD_TAG
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    if let Some(url) = records
        .iter()
        .find(|url| url.starts_with("https://"))
        .or(records.first())
    {
        return ToolReply::Voice { url: url.clone() };
    }

    ToolReply::text(AT_TAG.replace_all(text, ""))
}
