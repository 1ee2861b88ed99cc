//! Outbound OneBot v11 event frames.
//!
//! # Hierarchy
//!
//! ```text
//! meta_event
//! ├── LifecycleEvent   (sub_type = "connect")
//! └── HeartbeatEvent   (status + stat counters)
//! message
//! ├── group            (MessageEvent::group)
//! └── private          (MessageEvent::private)
//! ```

use serde::{Deserialize, Serialize};
use tether_core::{Counters, SettingsProvider};

use super::content::{MessageContent, encode};

/// Message id reported for synthesized events in numeric mode.
const SYNTHETIC_MESSAGE_ID: i64 = 123;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// Identity encoding
// ============================================================================

/// An identity as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    /// Integer identity.
    Numeric(i64),
    /// String identity.
    Text(String),
}

/// Wire encoding switches for outbound message events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventEncoding {
    /// Encode ids as strings.
    pub string_identity: bool,
    /// Encode content as a segment array.
    pub array_content: bool,
    /// Omit the extended `real_*` fields.
    pub native: bool,
}

impl EventEncoding {
    /// Reads the encoding switches from settings.
    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        Self {
            string_identity: settings.string_identity(),
            array_content: settings.array_content(),
            native: settings.native_mode(),
        }
    }

    fn id(&self, raw: &str) -> WireId {
        if self.string_identity {
            WireId::Text(raw.to_string())
        } else {
            WireId::Numeric(raw.trim().parse().unwrap_or_default())
        }
    }

    fn content(&self, text: &str) -> MessageContent {
        if self.array_content {
            MessageContent::Segments(encode(text))
        } else {
            MessageContent::Text(text.to_string())
        }
    }
}

// ============================================================================
// Meta events
// ============================================================================

/// Lifecycle event sent right after a connection is established.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub meta_event_type: String,
    pub post_type: String,
    pub self_id: i64,
    /// Sub-type ("enable", "disable", "connect").
    pub sub_type: String,
    pub time: i64,
}

impl LifecycleEvent {
    /// A `connect` lifecycle event for `self_id`.
    pub fn connect(self_id: i64) -> Self {
        Self {
            meta_event_type: "lifecycle".into(),
            post_type: "meta_event".into(),
            self_id,
            sub_type: "connect".into(),
            time: now(),
        }
    }
}

/// Heartbeat status block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub app_enabled: bool,
    pub app_good: bool,
    pub app_initialized: bool,
    pub good: bool,
    pub online: bool,
    pub plugins_good: Option<bool>,
    pub stat: HeartbeatStat,
}

/// Traffic statistics carried by a heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatStat {
    pub packet_received: u64,
    pub packet_sent: u64,
    pub packet_lost: u64,
    pub message_received: u64,
    pub message_sent: u64,
    pub disconnect_times: u64,
    pub lost_times: u64,
    pub last_message_time: i64,
}

/// Periodic heartbeat event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub post_type: String,
    pub meta_event_type: String,
    pub time: i64,
    pub self_id: i64,
    pub status: HeartbeatStatus,
    /// Heartbeat interval in milliseconds.
    pub interval: u64,
}

impl HeartbeatEvent {
    /// Builds a heartbeat reporting `counters`.
    pub fn new(self_id: i64, interval_ms: u64, counters: Counters) -> Self {
        Self {
            post_type: "meta_event".into(),
            meta_event_type: "heartbeat".into(),
            time: now(),
            self_id,
            status: HeartbeatStatus {
                app_enabled: true,
                app_good: true,
                app_initialized: true,
                good: true,
                online: true,
                plugins_good: None,
                stat: HeartbeatStat {
                    packet_received: 34933,
                    packet_sent: 8513,
                    message_received: counters.message_received,
                    message_sent: counters.message_sent,
                    last_message_time: counters.last_message_time,
                    ..Default::default()
                },
            },
            interval: interval_ms,
        }
    }
}

// ============================================================================
// Message events
// ============================================================================

/// Sender block of a message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: WireId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// A group or private message event posted to peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub raw_message: String,
    pub message: MessageContent,
    pub message_id: WireId,
    /// "group" or "private".
    pub message_type: String,
    pub post_type: String,
    pub self_id: i64,
    pub user_id: WireId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<WireId>,
    pub sender: Sender,
    pub sub_type: String,
    pub time: i64,
    pub message_seq: i64,
    pub font: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_group_id: Option<String>,
}

impl MessageEvent {
    /// A group message from `user_id` in `group_id`.
    pub fn group(
        text: &str,
        user_id: &str,
        group_id: &str,
        self_id: i64,
        encoding: EventEncoding,
    ) -> Self {
        let user = encoding.id(user_id);
        let (message_id, real_user_id, real_group_id) = if encoding.string_identity {
            (
                WireId::Text(String::new()),
                Some(user_id.to_string()),
                Some(group_id.to_string()),
            )
        } else {
            (WireId::Numeric(SYNTHETIC_MESSAGE_ID), None, None)
        };

        Self {
            raw_message: text.to_string(),
            message: encoding.content(text),
            message_id,
            message_type: "group".into(),
            post_type: "message".into(),
            self_id,
            user_id: user.clone(),
            group_id: Some(encoding.id(group_id)),
            sender: Sender {
                user_id: user,
                nickname: String::new(),
                sex: Some("0".into()),
                age: Some(0),
                area: Some("0".into()),
                level: Some("0".into()),
            },
            sub_type: "normal".into(),
            time: now(),
            message_seq: 0,
            font: 0,
            real_message_type: (!encoding.native).then(|| "group".to_string()),
            real_user_id,
            real_group_id,
        }
    }

    /// A private message from `user_id`.
    pub fn private(text: &str, user_id: &str, self_id: i64, encoding: EventEncoding) -> Self {
        let user = encoding.id(user_id);
        let message_id = if encoding.string_identity {
            WireId::Text(String::new())
        } else {
            WireId::Numeric(SYNTHETIC_MESSAGE_ID)
        };

        Self {
            raw_message: text.to_string(),
            message: encoding.content(text),
            message_id,
            message_type: "private".into(),
            post_type: "message".into(),
            self_id,
            user_id: user.clone(),
            group_id: None,
            sender: Sender {
                user_id: user,
                nickname: String::new(),
                sex: None,
                age: None,
                area: None,
                level: None,
            },
            sub_type: "friend".into(),
            time: now(),
            message_seq: 0,
            font: 0,
            real_message_type: (!encoding.native).then(|| "group_private".to_string()),
            real_user_id: encoding.string_identity.then(|| user_id.to_string()),
            real_group_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn test_lifecycle_frame_shape() {
        let value = serde_json::to_value(LifecycleEvent::connect(10086)).unwrap();
        assert_eq!(value["meta_event_type"], "lifecycle");
        assert_eq!(value["post_type"], "meta_event");
        assert_eq!(value["sub_type"], "connect");
        assert_eq!(value["self_id"], 10086);
        assert!(value["time"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_heartbeat_carries_counters() {
        let counters = Counters {
            message_received: 3,
            message_sent: 5,
            last_message_time: 1_700_000_000,
        };
        let value = serde_json::to_value(HeartbeatEvent::new(1, 5000, counters)).unwrap();
        assert_eq!(value["interval"], 5000);
        assert_eq!(value["status"]["online"], true);
        assert_eq!(value["status"]["plugins_good"], Value::Null);
        assert_eq!(value["status"]["stat"]["message_received"], 3);
        assert_eq!(value["status"]["stat"]["message_sent"], 5);
        assert_eq!(value["status"]["stat"]["last_message_time"], 1_700_000_000);
    }

    #[test]
    fn test_group_event_numeric_plain() {
        let event = MessageEvent::group("hi", "10001", "2002", 1, EventEncoding::default());
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["user_id"], 10001);
        assert_eq!(value["group_id"], 2002);
        assert_eq!(value["message_id"], 123);
        assert_eq!(value["message"], "hi");
        assert_eq!(value["message_type"], "group");
        assert_eq!(value["sender"]["sex"], "0");
        assert_eq!(value["real_message_type"], "group");
        assert!(value.get("real_user_id").is_none());
    }

    #[test]
    fn test_group_event_string_array() {
        let encoding = EventEncoding {
            string_identity: true,
            array_content: true,
            native: true,
        };
        let value = serde_json::to_value(MessageEvent::group("hey", "u-1", "g-1", 1, encoding)).unwrap();
        assert_eq!(value["user_id"], "u-1");
        assert_eq!(value["real_group_id"], "g-1");
        assert_eq!(value["message_id"], "");
        assert_eq!(value["message"], json!([{"type": "text", "data": {"text": "hey"}}]));
        assert!(value.get("real_message_type").is_none());
    }

    #[test]
    fn test_private_event() {
        let value =
            serde_json::to_value(MessageEvent::private("yo", "42", 1, EventEncoding::default())).unwrap();
        assert_eq!(value["message_type"], "private");
        assert_eq!(value["sub_type"], "friend");
        assert_eq!(value["sender"], json!({"user_id": 42, "nickname": ""}));
        assert!(value.get("group_id").is_none());
        assert_eq!(value["real_message_type"], "group_private");
    }
}
