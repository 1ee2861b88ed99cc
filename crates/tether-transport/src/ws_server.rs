//! Inbound websocket server for peers that dial in.
//!
//! Every accepted socket becomes an [`InboundPeer`] registered in
//! [`InboundPeers`] for as long as it stays open, so broadcasts reach it the
//! same way they reach dialed connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tether_core::{BoxedConnectionHandler, BoxedPeer, Peer, TransportError, TransportResult};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const INBOUND_QUEUE_CAPACITY: usize = 5000;

// =============================================================================
// Inbound peers
// =============================================================================

/// Handle for a peer connected to the inbound server.
pub struct InboundPeer {
    id: String,
    remote: SocketAddr,
    tx: mpsc::Sender<Vec<u8>>,
}

impl InboundPeer {
    /// Remote socket address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl Peer for InboundPeer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, message: &Value) -> TransportResult<()> {
        let data = serde_json::to_vec(message)?;
        self.tx
            .send(data)
            .await
            .map_err(|_| TransportError::ConnectionClosed {
                reason: format!("{} disconnected", self.id),
            })
    }
}

/// Registry of currently connected inbound peers.
#[derive(Default)]
pub struct InboundPeers {
    peers: RwLock<HashMap<String, BoxedPeer>>,
}

impl InboundPeers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, peer: BoxedPeer) {
        self.peers.write().insert(peer.id().to_string(), peer);
    }

    fn remove(&self, id: &str) {
        self.peers.write().remove(id);
    }

    /// Returns the connected peers.
    pub fn snapshot(&self) -> Vec<BoxedPeer> {
        self.peers.read().values().cloned().collect()
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Returns true when no peer is connected.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

// =============================================================================
// Server
// =============================================================================

/// Inbound server parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:8080`.
    pub addr: String,
    /// Websocket route.
    pub path: String,
    /// Heartbeat period for accepted peers.
    pub heartbeat_interval: Duration,
    /// Frames handled concurrently per connection.
    pub frame_workers: usize,
}

impl ServerConfig {
    /// Creates a config with a 5 second heartbeat.
    pub fn new(addr: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            path: path.into(),
            heartbeat_interval: Duration::from_secs(5),
            frame_workers: 64,
        }
    }
}

/// Shared state for the websocket route.
struct ServerState {
    handler: BoxedConnectionHandler,
    peers: Arc<InboundPeers>,
    heartbeat_interval: Duration,
    frame_workers: usize,
    shutdown: CancellationToken,
}

/// A running inbound server.
pub struct InboundServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl InboundServer {
    /// Binds the listener and starts serving in the background.
    ///
    /// The server stops when `shutdown` is cancelled.
    pub async fn bind(
        config: ServerConfig,
        handler: BoxedConnectionHandler,
        peers: Arc<InboundPeers>,
        shutdown: CancellationToken,
    ) -> TransportResult<Self> {
        let path = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };

        let state = Arc::new(ServerState {
            handler,
            peers,
            heartbeat_interval: config.heartbeat_interval,
            frame_workers: config.frame_workers.max(1),
            shutdown: shutdown.clone(),
        });
        let router = Router::new()
            .route(&path, get(ws_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(&config.addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, path = %path, "Inbound websocket server listening");

        let stop = shutdown.clone();
        tokio::spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { stop.cancelled().await });

            if let Err(e) = server.await {
                error!(error = %e, "Inbound websocket server error");
            }
            info!("Inbound websocket server stopped");
        });

        Ok(Self {
            local_addr,
            shutdown,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the server and drops every inbound connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!(remote_addr = %addr, "New websocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: Arc<ServerState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let id = format!("inbound-{}", Uuid::new_v4());

    match serde_json::to_string(&state.handler.connect_frame()) {
        Ok(connect) => {
            if let Err(e) = ws_tx.send(Message::Text(connect.into())).await {
                warn!(peer = %id, error = %e, "Failed to send connect frame");
                return;
            }
        }
        Err(e) => warn!(peer = %id, error = %e, "Failed to encode connect frame"),
    }

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(INBOUND_QUEUE_CAPACITY);
    let peer = Arc::new(InboundPeer {
        id: id.clone(),
        remote: addr,
        tx,
    });
    state.peers.insert(peer.clone());
    info!(peer = %id, remote_addr = %addr, "Inbound peer connected");

    let token = state.shutdown.child_token();

    let writer_token = token.clone();
    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        loop {
            let data = tokio::select! {
                _ = writer_token.cancelled() => break,
                data = rx.recv() => match data {
                    Some(data) => data,
                    None => break,
                },
            };
            let text = String::from_utf8_lossy(&data).to_string();
            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                warn!(peer = %writer_id, error = %e, "Write failed, connection closed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let period = state.heartbeat_interval;
    if !period.is_zero() {
        let heartbeat_token = token.clone();
        let heartbeat_peer = peer.clone();
        let handler = state.handler.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = heartbeat_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if heartbeat_peer
                    .send_message(&handler.heartbeat_frame(period))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    let workers = Arc::new(Semaphore::new(state.frame_workers));
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = ws_rx.next() => frame,
        };

        let data = match frame {
            Some(Ok(Message::Text(text))) => text.as_str().as_bytes().to_vec(),
            Some(Ok(Message::Binary(data))) => data.to_vec(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                info!(peer = %id, "Inbound peer closed connection");
                break;
            }
            Some(Err(e)) => {
                warn!(peer = %id, error = %e, "Inbound read failed");
                break;
            }
        };
        trace!(peer = %id, len = data.len(), "Received frame");

        let Ok(permit) = workers.clone().acquire_owned().await else {
            break;
        };
        let handler = state.handler.clone();
        let frame_peer: BoxedPeer = peer.clone();
        tokio::spawn(async move {
            handler.on_frame(frame_peer, data).await;
            drop(permit);
        });
    }

    token.cancel();
    let _ = writer.await;
    state.peers.remove(&id);
    info!(peer = %id, "Inbound peer disconnected");
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tether_core::ConnectionHandler;
    use tokio::time::sleep;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl ConnectionHandler for EchoHandler {
        fn connect_frame(&self) -> Value {
            json!({"kind": "connect"})
        }

        fn heartbeat_frame(&self, _interval: Duration) -> Value {
            json!({"kind": "heartbeat"})
        }

        async fn on_frame(&self, peer: BoxedPeer, data: Vec<u8>) {
            let frame: Value = serde_json::from_slice(&data).unwrap_or_default();
            let _ = peer.send_message(&json!({"kind": "echo", "frame": frame})).await;
        }
    }

    async fn wait_for(peers: &InboundPeers, len: usize) {
        for _ in 0..200 {
            if peers.len() == len {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {len} inbound peers, found {}", peers.len());
    }

    #[tokio::test]
    async fn test_inbound_peer_lifecycle() {
        let peers = Arc::new(InboundPeers::new());
        let shutdown = CancellationToken::new();
        let mut config = ServerConfig::new("127.0.0.1:0", "ws");
        config.heartbeat_interval = Duration::from_secs(60);

        let server = InboundServer::bind(config, Arc::new(EchoHandler), peers.clone(), shutdown)
            .await
            .unwrap();
        let url = format!("ws://{}/ws", server.local_addr());

        let (mut ws, _) = connect_async(url).await.unwrap();
        let read = |msg: Option<Result<ClientMessage, tokio_tungstenite::tungstenite::Error>>| -> Value {
            match msg {
                Some(Ok(ClientMessage::Text(text))) => serde_json::from_str(&text).unwrap(),
                other => panic!("unexpected frame: {other:?}"),
            }
        };

        assert_eq!(read(ws.next().await), json!({"kind": "connect"}));
        wait_for(&peers, 1).await;

        ws.send(ClientMessage::Text(json!({"action": "send_msg"}).to_string().into()))
            .await
            .unwrap();
        let echo = read(ws.next().await);
        assert_eq!(echo["frame"], json!({"action": "send_msg"}));

        let peer = peers.snapshot().pop().unwrap();
        assert!(peer.id().starts_with("inbound-"));
        peer.send_message(&json!({"kind": "broadcast"})).await.unwrap();
        assert_eq!(read(ws.next().await), json!({"kind": "broadcast"}));

        ws.close(None).await.unwrap();
        wait_for(&peers, 0).await;
        server.shutdown();
    }

    #[tokio::test]
    async fn test_inbound_heartbeat() {
        let peers = Arc::new(InboundPeers::new());
        let mut config = ServerConfig::new("127.0.0.1:0", "/");
        config.heartbeat_interval = Duration::from_millis(50);

        let server = InboundServer::bind(config, Arc::new(EchoHandler), peers, CancellationToken::new())
            .await
            .unwrap();
        let (mut ws, _) = connect_async(format!("ws://{}/", server.local_addr()))
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while kinds.len() < 2 {
            if let Some(Ok(ClientMessage::Text(text))) = ws.next().await {
                let value: Value = serde_json::from_str(&text).unwrap();
                kinds.push(value["kind"].as_str().unwrap_or_default().to_string());
            }
        }
        assert_eq!(kinds, vec!["connect", "heartbeat"]);
        server.shutdown();
    }
}
