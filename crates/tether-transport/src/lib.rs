//! # Tether Transport
//!
//! Websocket transports for the Tether bridge.
//!
//! Transports own sockets and tasks; what travels over them is decided by
//! the [`ConnectionHandler`](tether_core::ConnectionHandler) they are given.
//!
//! ## Features
//!
//! - `ws-client` (default): outbound [`PeerConnection`]s
//! - `ws-server` (default): inbound server for peers that dial in
//! - `full`: both
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  tether-runtime     │  (dials peers, starts the server)
//! ├─────────────────────┤
//! │  tether-transport   │  <- This crate
//! ├─────────────────────┤
//! │  tether-core        │  (Peer / ConnectionHandler seams)
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether_transport::{DialConfig, PeerConnection};
//!
//! let config = DialConfig::from_settings("ws://127.0.0.1:6700", settings.as_ref());
//! let peer = PeerConnection::dial(config, settings.clone(), handler.clone()).await?;
//! peer.send_message(&frame).await?;
//! ```

#[cfg(feature = "ws-client")]
pub mod ws_client;

#[cfg(feature = "ws-server")]
pub mod ws_server;

#[cfg(feature = "ws-client")]
pub use ws_client::{DialConfig, PeerConnection, resolve_token};

#[cfg(feature = "ws-server")]
pub use ws_server::{InboundPeer, InboundPeers, InboundServer, ServerConfig};
