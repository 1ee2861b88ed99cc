//! Outbound websocket peer connections.
//!
//! A [`PeerConnection`] owns one socket to one peer and three tasks:
//!
//! - **writer**: the only task that writes to the socket; drains the
//!   bounded outbound queue in FIFO order.
//! - **heartbeat**: enqueues a heartbeat frame every interval, then resubmits
//!   the writes that failed since the last tick. Each failed message gets
//!   one resend; heartbeats are never resent.
//! - **reader**: reads frames and hands each one to the
//!   [`ConnectionHandler`] on a short-lived task.
//!
//! The heartbeat and reader share a session token. A read error cancels the
//! session and starts one reconnect sequence; on success the socket is
//! swapped in place and a fresh session is started.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tether_core::{
    BoxedConnectionHandler, BoxedPeer, Peer, SettingsProvider, TransportError, TransportResult,
};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::time::{Instant, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Delay between dial attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Upper bound for one websocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);
/// Capacity of the outbound write queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;
/// Frames handled concurrently per connection.
pub const DEFAULT_FRAME_WORKERS: usize = 64;

const USER_AGENT: &str = "CQHttp/4.15.0";
const CLIENT_ROLE: &str = "Universal";

// =============================================================================
// Dial configuration
// =============================================================================

/// Parameters for dialing one peer.
#[derive(Debug, Clone)]
pub struct DialConfig {
    /// Peer websocket URL.
    pub url: String,
    /// Bot identity sent in `X-Self-ID`.
    pub self_id: i64,
    /// Bearer token sent as `Authorization: Token <token>`.
    pub token: Option<String>,
    /// Total dial attempts for the first connection (at least one is made).
    pub max_retries: u32,
    /// Delay between failed attempts.
    pub retry_delay: Duration,
    /// Timeout for one handshake.
    pub handshake_timeout: Duration,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// Concurrent frame handlers.
    pub frame_workers: usize,
    /// Keep failed writes for resend on the next heartbeat.
    pub record_failures: bool,
}

impl DialConfig {
    /// Creates a config with default timings.
    pub fn new(url: impl Into<String>, self_id: i64) -> Self {
        Self {
            url: url.into(),
            self_id,
            token: None,
            max_retries: 1,
            retry_delay: DEFAULT_RETRY_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat_interval: Duration::from_secs(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            frame_workers: DEFAULT_FRAME_WORKERS,
            record_failures: true,
        }
    }

    /// Builds the launch config for `url` from settings.
    pub fn from_settings(url: impl Into<String>, settings: &dyn SettingsProvider) -> Self {
        let url = url.into();
        let token = resolve_token(&settings.peer_addresses(), &settings.peer_tokens(), &url);
        Self {
            token,
            max_retries: settings.launch_retries(),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs()),
            record_failures: !settings.error_buffering_disabled(),
            ..Self::new(url, settings.self_identity())
        }
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the total number of dial attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay between dial attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the heartbeat period.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Picks the token for `url`.
///
/// The token is matched by the URL's position in `addresses`; an
/// `access_token` query parameter in the URL takes precedence.
pub fn resolve_token(addresses: &[String], tokens: &[String], url: &str) -> Option<String> {
    let from_query = url.split_once('?').and_then(|(_, query)| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "access_token")
            .map(|(_, value)| value.to_string())
    });
    if let Some(token) = from_query.filter(|t| !t.is_empty()) {
        return Some(token);
    }

    addresses
        .iter()
        .position(|address| address == url)
        .and_then(|index| tokens.get(index))
        .filter(|token| !token.is_empty())
        .cloned()
}

// =============================================================================
// Dialing
// =============================================================================

async fn connect_once(config: &DialConfig, token: Option<&str>) -> TransportResult<WsStream> {
    let failed = |reason: String| TransportError::ConnectionFailed {
        url: config.url.clone(),
        reason,
    };

    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| failed(format!("invalid request: {e}")))?;
    let headers = request.headers_mut();
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    headers.insert("x-client-role", HeaderValue::from_static(CLIENT_ROLE));
    headers.insert("x-self-id", HeaderValue::from(config.self_id));
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|e| failed(format!("invalid token: {e}")))?;
        headers.insert("authorization", value);
    }

    match timeout(config.handshake_timeout, connect_async(request)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(failed(e.to_string())),
        Err(_) => Err(failed(format!(
            "handshake timed out after {:?}",
            config.handshake_timeout
        ))),
    }
}

/// Dials with up to `attempts` tries, sleeping the retry delay in between.
async fn establish(
    config: &DialConfig,
    token: Option<&str>,
    attempts: u32,
) -> TransportResult<WsStream> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        info!(peer = %config.url, attempt, max = attempts, "Connecting to peer");
        match connect_once(config, token).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!(peer = %config.url, attempt, error = %e, "Connection attempt failed");
                last_error = e.to_string();
            }
        }
        if attempt < attempts {
            sleep(config.retry_delay).await;
        }
    }

    Err(TransportError::RetriesExhausted {
        url: config.url.clone(),
        attempts,
        reason: last_error,
    })
}

/// One item of the outbound write queue.
#[derive(Debug)]
enum Outbound {
    /// A message written for the first time.
    Fresh(Vec<u8>),
    /// A liveness frame; stale once the next tick fires.
    Heartbeat(Vec<u8>),
    /// A previously failed message on its only retry.
    Resend(Vec<u8>),
}

impl Outbound {
    fn data(&self) -> &[u8] {
        match self {
            Self::Fresh(data) | Self::Heartbeat(data) | Self::Resend(data) => data,
        }
    }
}

fn text_frame(data: &[u8]) -> Message {
    Message::Text(String::from_utf8_lossy(data).to_string().into())
}

// =============================================================================
// PeerConnection
// =============================================================================

/// A live websocket connection to one peer.
pub struct PeerConnection {
    config: DialConfig,
    settings: Arc<dyn SettingsProvider>,
    handler: BoxedConnectionHandler,
    queue: mpsc::Sender<Outbound>,
    sink: Mutex<Option<WsSink>>,
    failed: parking_lot::Mutex<Vec<Vec<u8>>>,
    workers: Arc<Semaphore>,
    reconnecting: AtomicBool,
    closed: AtomicBool,
    shutdown: CancellationToken,
    session: parking_lot::Mutex<CancellationToken>,
}

impl PeerConnection {
    /// Dials `config.url` and starts the connection tasks.
    ///
    /// The handler's connect frame is written before anything else. If every
    /// attempt fails, no connection is created.
    pub async fn dial(
        config: DialConfig,
        settings: Arc<dyn SettingsProvider>,
        handler: BoxedConnectionHandler,
    ) -> TransportResult<Arc<Self>> {
        let stream = establish(&config, config.token.as_deref(), config.max_retries).await?;
        let (mut sink, source) = stream.split();

        let connect = serde_json::to_vec(&handler.connect_frame())?;
        sink.send(text_frame(&connect))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shutdown = CancellationToken::new();
        let session = shutdown.child_token();

        let connection = Arc::new(Self {
            workers: Arc::new(Semaphore::new(config.frame_workers.max(1))),
            config,
            settings,
            handler,
            queue,
            sink: Mutex::new(Some(sink)),
            failed: parking_lot::Mutex::new(Vec::new()),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown,
            session: parking_lot::Mutex::new(session.clone()),
        });

        tokio::spawn(connection.clone().run_writer(rx));
        connection.start_session(session, source);

        info!(peer = %connection.config.url, "Peer connected");
        Ok(connection)
    }

    /// The dialed URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Whether the connection has been closed or gave up reconnecting.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of failed writes waiting for the next heartbeat.
    pub fn failed_len(&self) -> usize {
        self.failed.lock().len()
    }

    /// Cancels every task and closes the socket.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.shutdown.cancel();
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        info!(peer = %self.config.url, "Peer connection closed");
    }

    fn start_session(self: &Arc<Self>, session: CancellationToken, source: WsSource) {
        tokio::spawn(self.clone().run_heartbeat(session.clone()));
        tokio::spawn(self.clone().run_reader(session, source));
    }

    fn record_failure(&self, item: Outbound) {
        match item {
            Outbound::Fresh(data) if self.config.record_failures => self.failed.lock().push(data),
            Outbound::Fresh(_) | Outbound::Heartbeat(_) => {}
            Outbound::Resend(data) => {
                debug!(peer = %self.config.url, len = data.len(), "Resend failed, dropping message");
            }
        }
    }

    async fn enqueue(&self, item: Outbound) -> TransportResult<()> {
        self.queue
            .send(item)
            .await
            .map_err(|_| TransportError::ConnectionClosed {
                reason: format!("writer for {} stopped", self.config.url),
            })
    }

    async fn run_writer(self: Arc<Self>, mut rx: mpsc::Receiver<Outbound>) {
        loop {
            let item = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                item = rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let mut sink = self.sink.lock().await;
            let Some(ws) = sink.as_mut() else {
                drop(sink);
                self.record_failure(item);
                continue;
            };
            let result = ws.send(text_frame(item.data())).await;
            drop(sink);
            if let Err(e) = result {
                warn!(peer = %self.config.url, error = %e, "Write failed");
                self.record_failure(item);
            }
        }
        debug!(peer = %self.config.url, "Writer stopped");
    }

    async fn run_heartbeat(self: Arc<Self>, session: CancellationToken) {
        let period = self.config.heartbeat_interval;
        if period.is_zero() {
            return;
        }
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = session.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let frame = self.handler.heartbeat_frame(period);
            match serde_json::to_vec(&frame) {
                Ok(data) => {
                    if self.enqueue(Outbound::Heartbeat(data)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(peer = %self.config.url, error = %e, "Failed to encode heartbeat"),
            }

            let failed = std::mem::take(&mut *self.failed.lock());
            if !failed.is_empty() {
                debug!(peer = %self.config.url, count = failed.len(), "Resending failed writes");
            }
            for data in failed {
                if self.enqueue(Outbound::Resend(data)).await.is_err() {
                    break;
                }
            }
        }
        trace!(peer = %self.config.url, "Heartbeat stopped");
    }

    async fn run_reader(self: Arc<Self>, session: CancellationToken, mut source: WsSource) {
        loop {
            let frame = tokio::select! {
                _ = session.cancelled() => return,
                frame = source.next() => frame,
            };

            let data = match frame {
                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(Message::Binary(data))) => data.to_vec(),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(reason))) => {
                    info!(peer = %self.config.url, reason = ?reason, "Peer closed connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(peer = %self.config.url, error = %e, "Read failed");
                    break;
                }
                None => {
                    info!(peer = %self.config.url, "Stream ended");
                    break;
                }
            };

            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };
            let handler = self.handler.clone();
            let peer: BoxedPeer = self.clone();
            tokio::spawn(async move {
                handler.on_frame(peer, data).await;
                drop(permit);
            });
        }

        session.cancel();
        if !self.is_closed() {
            tokio::spawn(self.reconnect());
        }
    }

    async fn reconnect(self: Arc<Self>) {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let token = resolve_token(
            &self.settings.peer_addresses(),
            &self.settings.peer_tokens(),
            &self.config.url,
        );
        let attempts = self.settings.max_reconnect_retries();
        warn!(peer = %self.config.url, max = attempts, "Reconnecting");

        let stream = tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = establish(&self.config, token.as_deref(), attempts) => match result {
                Ok(stream) => Some(stream),
                Err(e) => {
                    error!(peer = %self.config.url, error = %e, "Reconnect failed, connection closed");
                    None
                }
            },
        };
        let Some(stream) = stream else {
            self.closed.store(true, Ordering::Release);
            self.shutdown.cancel();
            self.reconnecting.store(false, Ordering::Release);
            return;
        };

        let (mut new_sink, source) = stream.split();
        match serde_json::to_vec(&self.handler.connect_frame()) {
            Ok(connect) => {
                if let Err(e) = new_sink.send(text_frame(&connect)).await {
                    warn!(peer = %self.config.url, error = %e, "Failed to send connect frame");
                }
            }
            Err(e) => warn!(peer = %self.config.url, error = %e, "Failed to encode connect frame"),
        }
        *self.sink.lock().await = Some(new_sink);

        let session = self.shutdown.child_token();
        let previous = std::mem::replace(&mut *self.session.lock(), session.clone());
        previous.cancel();
        self.start_session(session, source);

        self.reconnecting.store(false, Ordering::Release);
        info!(peer = %self.config.url, "Reconnected");
    }
}

#[async_trait]
impl Peer for PeerConnection {
    fn id(&self) -> &str {
        &self.config.url
    }

    async fn send_message(&self, message: &Value) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed {
                reason: format!("{} is closed", self.config.url),
            });
        }
        let data = serde_json::to_vec(message)?;
        self.enqueue(Outbound::Fresh(data)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use tether_core::ConnectionHandler;

    struct EchoHandler {
        frames: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionHandler for EchoHandler {
        fn connect_frame(&self) -> Value {
            json!({"kind": "connect"})
        }

        fn heartbeat_frame(&self, interval: Duration) -> Value {
            json!({"kind": "heartbeat", "interval": interval.as_millis() as u64})
        }

        async fn on_frame(&self, peer: BoxedPeer, data: Vec<u8>) {
            let frame: Value = serde_json::from_slice(&data).unwrap_or_default();
            let _ = peer.send_message(&json!({"kind": "echo", "frame": frame})).await;
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestSettings;

    impl SettingsProvider for TestSettings {
        fn peer_addresses(&self) -> Vec<String> {
            Vec::new()
        }
        fn peer_tokens(&self) -> Vec<String> {
            Vec::new()
        }
        fn max_reconnect_retries(&self) -> u32 {
            3
        }
        fn heartbeat_interval_secs(&self) -> u64 {
            5
        }
        fn launch_retries(&self) -> u32 {
            1
        }
        fn request_timeout_secs(&self) -> u64 {
            4
        }
        fn self_identity(&self) -> i64 {
            10086
        }
        fn error_buffering_disabled(&self) -> bool {
            false
        }
        fn string_identity(&self) -> bool {
            false
        }
        fn array_content(&self) -> bool {
            false
        }
    }

    fn handler() -> Arc<EchoHandler> {
        Arc::new(EchoHandler {
            frames: AtomicUsize::new(0),
        })
    }

    async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_dial_sends_connect_first_and_routes_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let first = next_json(&mut ws).await;
            ws.send(Message::Text(json!({"action": "ping"}).to_string().into()))
                .await
                .unwrap();
            let echo = next_json(&mut ws).await;
            let pushed = next_json(&mut ws).await;
            (first, echo, pushed)
        });

        let handler = handler();
        let config = DialConfig::new(&url, 1).with_heartbeat_interval(Duration::from_secs(60));
        let conn = PeerConnection::dial(config, Arc::new(TestSettings), handler.clone())
            .await
            .unwrap();

        while handler.frames.load(Ordering::SeqCst) == 0 {
            sleep(Duration::from_millis(5)).await;
        }
        conn.send_message(&json!({"kind": "pushed"})).await.unwrap();

        let (first, echo, pushed) = server.await.unwrap();
        assert_eq!(first, json!({"kind": "connect"}));
        assert_eq!(echo["frame"], json!({"action": "ping"}));
        assert_eq!(pushed, json!({"kind": "pushed"}));

        conn.close().await;
    }

    #[tokio::test]
    async fn test_heartbeat_is_sent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _connect = next_json(&mut ws).await;
            next_json(&mut ws).await
        });

        let config = DialConfig::new(&url, 1).with_heartbeat_interval(Duration::from_millis(50));
        let conn = PeerConnection::dial(config, Arc::new(TestSettings), handler())
            .await
            .unwrap();

        let heartbeat = server.await.unwrap();
        assert_eq!(heartbeat, json!({"kind": "heartbeat", "interval": 50}));
        conn.close().await;
    }

    #[tokio::test]
    async fn test_dial_unreachable_exhausts_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let config = DialConfig::new(&url, 1)
            .with_max_retries(3)
            .with_retry_delay(Duration::from_millis(50));
        let started = std::time::Instant::now();
        let result = PeerConnection::dial(config, Arc::new(TestSettings), handler()).await;

        match result {
            Err(TransportError::RetriesExhausted { attempts, url: failed, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(failed, url);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("dial should fail"),
        }
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let conn = PeerConnection::dial(DialConfig::new(&url, 1), Arc::new(TestSettings), handler())
            .await
            .unwrap();
        conn.close().await;

        assert!(conn.is_closed());
        let result = conn.send_message(&json!({})).await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed { .. })));
    }

    #[tokio::test]
    async fn test_reconnects_after_peer_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = next_json(&mut ws).await;
            ws.close(None).await.unwrap();
            drop(ws);

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            next_json(&mut ws).await
        });

        let config = DialConfig::new(&url, 1)
            .with_retry_delay(Duration::from_millis(20))
            .with_heartbeat_interval(Duration::from_secs(60));
        let conn = PeerConnection::dial(config, Arc::new(TestSettings), handler())
            .await
            .unwrap();

        let connect = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(connect, json!({"kind": "connect"}));
        assert!(!conn.is_closed());
        conn.close().await;
    }

    async fn sink_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });
        url
    }

    async fn wait_for_failed(conn: &PeerConnection, len: usize) {
        for _ in 0..200 {
            if conn.failed_len() == len {
                return;
            }
            sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {len} failed writes, found {}", conn.failed_len());
    }

    #[tokio::test]
    async fn test_failed_write_is_resent_once_then_dropped() {
        let url = sink_server().await;
        let config = DialConfig::new(&url, 1).with_heartbeat_interval(Duration::from_millis(100));
        let conn = PeerConnection::dial(config, Arc::new(TestSettings), handler())
            .await
            .unwrap();

        // Every write fails from here on.
        conn.sink.lock().await.take();
        conn.send_message(&json!({"kind": "lost"})).await.unwrap();
        wait_for_failed(&conn, 1).await;

        // Several ticks: one resend, failing heartbeats, nothing re-recorded.
        sleep(Duration::from_millis(150)).await;
        let mut samples = vec![conn.failed_len()];
        for _ in 0..3 {
            sleep(Duration::from_millis(100)).await;
            samples.push(conn.failed_len());
        }
        assert_eq!(samples, vec![0, 0, 0, 0]);
        conn.close().await;
    }

    #[tokio::test]
    async fn test_failures_not_recorded_when_buffering_disabled() {
        let url = sink_server().await;
        let mut config = DialConfig::new(&url, 1).with_heartbeat_interval(Duration::from_secs(60));
        config.record_failures = false;
        let conn = PeerConnection::dial(config, Arc::new(TestSettings), handler())
            .await
            .unwrap();

        conn.sink.lock().await.take();
        conn.send_message(&json!({"kind": "lost"})).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(conn.failed_len(), 0);
        conn.close().await;
    }

    #[test]
    fn test_resolve_token() {
        let addresses = vec!["ws://a".to_string(), "ws://b".to_string()];
        let tokens = vec!["ta".to_string()];

        assert_eq!(resolve_token(&addresses, &tokens, "ws://a"), Some("ta".into()));
        assert_eq!(resolve_token(&addresses, &tokens, "ws://b"), None);
        assert_eq!(
            resolve_token(&addresses, &tokens, "ws://c?x=1&access_token=q"),
            Some("q".into())
        );
    }

    #[test]
    fn test_dial_config_from_settings() {
        let config = DialConfig::from_settings("ws://x", &TestSettings);
        assert_eq!(config.self_id, 10086);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.record_failures);
        assert!(config.token.is_none());
    }
}
