//! Data models for the OneBot v11 wire protocol.
//!
//! This module contains the frames exchanged with peers and the codec
//! between their message content and canonical tagged text.

pub mod action;
pub mod api;
pub mod card;
pub mod content;
pub mod event;
pub mod segment;

pub use action::{ActionMessage, ActionParams, SEND_PREFIX};
pub use api::{ApiResponse, QUERY_ACTIONS, canned_response};
pub use card::{ImagePolicy, RichCard, decode_payload, render_keyboard};
pub use content::{MessageContent, encode};
pub use event::{
    EventEncoding, HeartbeatEvent, HeartbeatStat, HeartbeatStatus, LifecycleEvent, MessageEvent,
    Sender, WireId,
};
pub use segment::{
    AtData, Category, MarkdownData, MediaData, Segment, TextData, parse_canonical,
    unescape_cq_text,
};
