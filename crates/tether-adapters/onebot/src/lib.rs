//! # Tether Adapter for OneBot v11
//!
//! This crate speaks the OneBot v11 side of the bridge.
//!
//! ## Overview
//!
//! Peers are OneBot v11 applications connected over websockets. This adapter
//! handles:
//!
//! - Outbound frames: lifecycle, heartbeat and group/private message events
//! - Inbound action frames and the canned answers to capability queries
//! - The content codec between segment lists and canonical tagged text,
//!   including rich markdown cards
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_adapter_onebot::OneBotHandler;
//! use tether_core::{CorrelationTable, PassthroughIdentity};
//!
//! let table = Arc::new(CorrelationTable::new());
//! let handler = OneBotHandler::new(settings, stats, Arc::new(PassthroughIdentity), table.clone());
//! // hand `handler` to every transport connection
//! ```
//!
//! ## Content Codec
//!
//! ```rust,ignore
//! use tether_adapter_onebot::{ImagePolicy, MessageContent, encode};
//!
//! let content: MessageContent = serde_json::from_str(r#"[{"type":"text","data":{"text":"hi"}}]"#)?;
//! let canonical = content.decode(ImagePolicy::Inline);
//! let segments = encode(&canonical);
//! ```

pub mod handler;
pub mod model;

pub use handler::OneBotHandler;

pub use model::action::{ActionMessage, ActionParams, SEND_PREFIX};
pub use model::api::{ApiResponse, canned_response};
pub use model::card::{ImagePolicy, RichCard, decode_payload};
pub use model::content::{MessageContent, encode};
pub use model::event::{EventEncoding, HeartbeatEvent, LifecycleEvent, MessageEvent, WireId};
pub use model::segment::{Segment, parse_canonical, unescape_cq_text};
