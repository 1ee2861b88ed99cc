//! Tether Runtime - configuration, logging and orchestration for the bridge.
//!
//! This crate provides:
//! - Configuration loading and validation (`config`)
//! - Logging setup (`logging`)
//! - In-memory heartbeat counters (`MemoryStats`)
//! - The request/response [`Bridge`] over every connected peer
//! - Runtime orchestration (`TetherRuntime`)
//!
//! # Transports
//!
//! Outbound websocket connections are always available. The inbound
//! websocket server is compiled in with the `ws-server` feature (default)
//! and enabled with `server.enabled` in the configuration.
//!
//! ```ignore
//! use tether_runtime::{TetherRuntime, ToolRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TetherRuntime::builder().config_file("tether.toml").build()?;
//!     let bridge = runtime.start().await?;
//!
//!     let reply = bridge.call(ToolRequest::group("帮助", "10001", "20002")).await;
//!     println!("{reply:?}");
//!
//!     runtime.stop().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod stats;

// Re-exports
pub use bridge::{Bridge, TIMEOUT_REPLY, ToolReply, ToolRequest, classify};
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, Settings, TetherConfig, WsServerConfig,
    validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{RuntimeBuilder, TetherRuntime};
pub use stats::MemoryStats;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
