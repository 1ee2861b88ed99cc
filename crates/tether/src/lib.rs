//! # Tether
//!
//! A bridge that makes OneBot v11 chat-bot peers look like a synchronous
//! request/response call.
//!
//! ## Overview
//!
//! Tether dials every configured peer over websockets (and optionally accepts
//! peers that dial in), broadcasts each request as a message event, and
//! waits for the first reply a peer sends back for the requesting user.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ToolRequest   ┌────────┐  event frames  ┌───────────────┐
//! │ agent-facing │───────────────▶│ Bridge │───────────────▶│ OneBot peers  │
//! │   boundary   │◀───────────────│        │◀───────────────│ (ws in / out) │
//! └──────────────┘   ToolReply     └────────┘  send_* actions └───────────────┘
//! ```
//!
//! - **Core**: correlation table, broadcast dispatcher, collaborator traits
//! - **Adapter**: OneBot wire model, content codec, frame handler
//! - **Transport**: websocket peer connections and inbound server
//! - **Runtime**: configuration, logging, stats, the bridge
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TetherRuntime::builder().config_file("tether.toml").build()?;
//!     let bridge = runtime.start().await?;
//!
//!     match bridge.call(ToolRequest::group("帮助", "10001", "20002")).await {
//!         ToolReply::Text { text } => println!("{text}"),
//!         other => println!("{other:?}"),
//!     }
//!
//!     runtime.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `ws-server` (default): accept peers that dial in
//! - `json-log`: JSON log output

pub use tether_adapter_onebot as onebot;
pub use tether_core as core;
pub use tether_runtime as runtime;
pub use tether_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tether::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use tether_runtime::{
        Bridge, RuntimeBuilder, TetherConfig, TetherRuntime, ToolReply, ToolRequest,
    };
    pub use tether_runtime::config::{ConfigLoader, load_config, load_config_from_file};

    // Core engine
    pub use tether_core::{CorrelationTable, DispatchMode, Dispatcher, Peer};

    // Content codec
    pub use tether_adapter_onebot::{ImagePolicy, MessageContent, Segment};
}
