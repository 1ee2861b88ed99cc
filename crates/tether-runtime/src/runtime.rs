//! Runtime orchestration: dial peers, serve inbound peers, hand out a [`Bridge`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tether_runtime::TetherRuntime;
//!
//! // Custom configuration path
//! let runtime = TetherRuntime::builder()
//!     .config_file("config/tether.toml")
//!     .build()?;
//!
//! let bridge = runtime.start().await?;
//! let reply = bridge.call(ToolRequest::group("帮助", "10001", "20002")).await;
//! runtime.stop().await;
//! ```

use std::future::Future;
use std::sync::Arc;
#[cfg(feature = "ws-server")]
use std::time::Duration;

use futures::future::join_all;
use tether_adapter_onebot::OneBotHandler;
use tether_core::{
    BoxedConnectionHandler, BoxedPeer, CorrelationTable, PassthroughIdentity, SettingsProvider,
};
#[cfg(feature = "ws-server")]
use tether_transport::{InboundPeers, InboundServer, ServerConfig};
use tether_transport::{DialConfig, PeerConnection};
use tokio::signal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bridge::Bridge;
use crate::config::{ConfigLoader, ConfigResult, Settings, TetherConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::stats::MemoryStats;

/// Live connections owned by a started runtime.
struct Running {
    bridge: Arc<Bridge>,
    peers: Vec<Arc<PeerConnection>>,
    shutdown: CancellationToken,
}

/// The Tether runtime.
///
/// ```rust,ignore
/// let config = load_config_from_file("tether.toml")?;
/// let runtime = TetherRuntime::from_config(&config);
/// runtime.run().await?;
/// ```
pub struct TetherRuntime {
    config: TetherConfig,
    running: Mutex<Option<Running>>,
}

impl TetherRuntime {
    /// Creates a runtime from the default configuration locations.
    ///
    /// Falls back to defaults when no configuration can be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            TetherConfig::default()
        });
        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging.
    pub fn from_config(config: &TetherConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            peers = config.bridge.peer_addresses.len(),
            server = config.server.enabled,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            running: Mutex::new(None),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    /// Returns whether the runtime is currently running.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// The bridge of the running runtime.
    pub async fn bridge(&self) -> RuntimeResult<Arc<Bridge>> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| Arc::clone(&running.bridge))
            .ok_or(RuntimeError::NotStarted)
    }

    /// Dials every peer, starts the inbound server and returns the bridge.
    ///
    /// Peers that cannot be reached are logged and skipped. Starting an
    /// already running runtime returns the existing bridge.
    pub async fn start(&self) -> RuntimeResult<Arc<Bridge>> {
        let mut running = self.running.lock().await;
        if let Some(running) = running.as_ref() {
            warn!("Runtime is already running");
            return Ok(Arc::clone(&running.bridge));
        }

        info!("Starting Tether runtime");

        let settings = Arc::new(self.config.bridge.clone());
        let table = Arc::new(CorrelationTable::new());
        let stats = Arc::new(MemoryStats::new());
        let handler: BoxedConnectionHandler = Arc::new(OneBotHandler::new(
            settings.clone(),
            stats.clone(),
            Arc::new(PassthroughIdentity),
            table.clone(),
        ));

        let peers = Self::dial_all(&settings, &handler).await;
        let shutdown = CancellationToken::new();

        let outbound: Vec<BoxedPeer> = peers.iter().map(|p| p.clone() as BoxedPeer).collect();
        let bridge = Bridge::new(settings.clone(), table, stats, outbound);

        #[cfg(feature = "ws-server")]
        let bridge = if self.config.server.enabled {
            let inbound = Arc::new(InboundPeers::new());
            let mut server_config = ServerConfig::new(
                self.config.server.bind_addr(),
                self.config.server.path.clone(),
            );
            server_config.heartbeat_interval =
                Duration::from_secs(settings.heartbeat_interval_secs);

            InboundServer::bind(
                server_config,
                handler.clone(),
                inbound.clone(),
                shutdown.child_token(),
            )
            .await?;
            bridge.with_inbound(inbound)
        } else {
            bridge
        };

        #[cfg(not(feature = "ws-server"))]
        if self.config.server.enabled {
            warn!("Inbound server requested but the `ws-server` feature is disabled");
        }

        if peers.is_empty() && !self.config.server.enabled {
            warn!("No peer connected and inbound server disabled, requests will time out");
        }

        let bridge = Arc::new(bridge);
        *running = Some(Running {
            bridge: Arc::clone(&bridge),
            peers,
            shutdown,
        });

        info!("Runtime started");
        Ok(bridge)
    }

    async fn dial_all(
        settings: &Arc<Settings>,
        handler: &BoxedConnectionHandler,
    ) -> Vec<Arc<PeerConnection>> {
        let provider: Arc<dyn SettingsProvider> = settings.clone();

        let dials = settings.peer_addresses.iter().map(|url| {
            let config = DialConfig::from_settings(url.clone(), provider.as_ref());
            let provider = Arc::clone(&provider);
            let handler = Arc::clone(handler);
            async move {
                let url = config.url.clone();
                (url, PeerConnection::dial(config, provider, handler).await)
            }
        });

        let mut peers = Vec::new();
        for (url, result) in join_all(dials).await {
            match result {
                Ok(peer) => peers.push(peer),
                Err(e) => error!(peer = %url, error = %e, "Failed to connect to peer, skipping"),
            }
        }
        peers
    }

    /// Closes every peer connection and stops the inbound server.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            warn!("Runtime is not running");
            return;
        };

        info!("Stopping Tether runtime");
        running.shutdown.cancel();
        join_all(running.peers.iter().map(|peer| peer.close())).await;
        info!("Runtime stopped");
    }

    /// Starts the runtime and runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Tether runtime is now running. Press Ctrl+C to stop.");

        let result = wait_for_shutdown().await;
        self.stop().await;
        result
    }

    /// Starts the runtime and runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }
}

impl Default for TetherRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`TetherRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: TetherConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, then builds the runtime.
    pub fn build(self) -> ConfigResult<TetherRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(TetherRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
