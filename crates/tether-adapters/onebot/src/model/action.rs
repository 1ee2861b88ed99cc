//! Inbound action frames.
//!
//! Peers answer by calling actions on us: `{action, params, echo}`. Only
//! `send*` actions carry replies worth correlating; the rest are capability
//! queries answered from [`api`](super::api).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_core::ContentLength;

use super::card::ImagePolicy;
use super::content::MessageContent;

/// Prefix shared by every action that carries a reply.
pub const SEND_PREFIX: &str = "send";

/// Longest `params.message` rendering written to logs, in characters.
const LOG_MESSAGE_LIMIT: usize = 800;

/// A decoded action frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    /// Action name, e.g. `send_group_msg`.
    pub action: String,
    /// Action parameters.
    #[serde(default)]
    pub params: ActionParams,
    /// Opaque token echoed back in the response.
    #[serde(default)]
    pub echo: Value,
}

/// Parameters of an action frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionParams {
    /// Addressed user, as a number or a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    /// Addressed group, as a number or a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Value>,
    /// Message content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageContent>,
    /// Any other parameters.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionMessage {
    /// Parses a frame from raw bytes.
    pub fn parse(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// Whether this action carries a reply to correlate.
    pub fn is_send(&self) -> bool {
        self.action.starts_with(SEND_PREFIX)
    }

    /// The addressed user rendered as a correlation key.
    pub fn user_key(&self) -> String {
        id_string(self.params.user_id.as_ref())
    }

    /// The addressed group rendered as a string, empty when absent.
    pub fn group_key(&self) -> String {
        id_string(self.params.group_id.as_ref())
    }

    /// Decodes the message content into canonical text.
    pub fn content_text(&self, images: ImagePolicy) -> String {
        self.params
            .message
            .as_ref()
            .map(|message| message.decode(images))
            .unwrap_or_default()
    }

    /// A log-friendly rendering with the message truncated.
    pub fn log_summary(&self) -> String {
        let message = self
            .params
            .message
            .as_ref()
            .and_then(|m| serde_json::to_string(m).ok())
            .unwrap_or_default();
        let message: String = if message.chars().count() > LOG_MESSAGE_LIMIT {
            message.chars().take(LOG_MESSAGE_LIMIT).chain("...".chars()).collect()
        } else {
            message
        };
        format!(
            "action={} user_id={} group_id={} message={}",
            self.action,
            self.user_key(),
            self.group_key(),
            message
        )
    }
}

impl ContentLength for ActionMessage {
    fn content_len(&self) -> usize {
        self.content_text(ImagePolicy::Strip).len()
    }
}

fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
