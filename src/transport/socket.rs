//! WebSocket socket shim and event loop.
//!
//! [`PostgresWs`] stands in for a TCP socket under a PostgreSQL client.
//! It owns one WebSocket and one [`Pipeline`]; a spawned tokio task runs
//! the event loop that handles:
//!
//! - The startup message on open
//! - Outbound writes, direct or queued through the pipeline
//! - Inbound frames, observed by the pipeline then forwarded as data events
//! - The liveness watchdog
//! - Teardown on close, error or forced close
//!
//! Once connected, all pipeline mutation happens on the event loop task,
//! one event at a time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use crate::config::WsConfig;
use crate::error::{Error, Result};

use super::events::{Emitter, EventKind, SocketEvent};
use super::pipeline::{Action, Pipeline, ReadyState};

// ============================================================================
// Constants
// ============================================================================

/// Bound on waiting for the peer to finish the closing handshake.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Commands from the handle to the event loop.
enum SocketCommand {
    /// Outbound bytes from the client.
    Write(Bytes),
    /// Close the WebSocket.
    Close,
}

/// State shared between the handle and the event loop.
struct Shared {
    connected: AtomicBool,
    pipeline: Mutex<Pipeline>,
    emitter: Emitter,
}

// ============================================================================
// PostgresWs
// ============================================================================

/// PostgreSQL wire protocol carried over a WebSocket.
///
/// Presents the surface of a duplex socket: `write`, `end`, `destroy`,
/// `data`/`error`/`close` events, and no-op flow-control methods.
///
/// # Example
///
/// ```ignore
/// use dsql_postgres_ws::{PostgresWs, WsConfig};
///
/// let socket = PostgresWs::new(WsConfig::new("abc.dsql.us-east-1.on.aws"));
/// socket.on_data(|bytes| println!("{} bytes", bytes.len()));
/// socket.connect().await?;
/// socket.write(dsql_postgres_ws::protocol::simple_query("select now()"));
/// ```
pub struct PostgresWs {
    config: Arc<WsConfig>,
    shared: Arc<Shared>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<SocketCommand>>>,
}

impl fmt::Debug for PostgresWs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresWs")
            .field("url", &self.config.url())
            .field("connected", &self.is_connected())
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PostgresWs - Constructor & Lifecycle
// ============================================================================

impl PostgresWs {
    /// Creates an unconnected socket.
    #[must_use]
    pub fn new(config: WsConfig) -> Self {
        let pipeline = Pipeline::new(config.connection_check);
        Self {
            config: Arc::new(config),
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                pipeline: Mutex::new(pipeline),
                emitter: Emitter::default(),
            }),
            command_tx: Mutex::new(None),
        }
    }

    /// Opens the WebSocket and starts the event loop.
    ///
    /// The startup message is the first frame sent.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if already connected or the handshake fails
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::connection("socket is already connected"));
        }

        let url = self.config.url();
        let timeout_ms = self.config.connect_timeout.as_millis() as u64;

        let (ws_stream, _) = timeout(self.config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(timeout_ms))?
            .map_err(|e| {
                Error::connection(format!("{e} {}:{}", self.config.host, self.config.port))
            })?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            "WebSocket connection established"
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.command_tx.lock() = Some(command_tx);
        self.shared.pipeline.lock().open();
        self.shared.connected.store(true, Ordering::SeqCst);

        let (sink, source) = ws_stream.split();
        let event_loop = EventLoop {
            config: Arc::clone(&self.config),
            shared: Arc::clone(&self.shared),
            sink: Some(sink),
            probe_deadline: None,
        };
        tokio::spawn(event_loop.run(source, command_rx));

        Ok(())
    }

    /// Hands outbound bytes to the transport.
    ///
    /// Returns `false` without side effects when the socket is not open;
    /// the caller decides whether to buffer or retry.
    pub fn write(&self, data: impl Into<Bytes>) -> bool {
        self.try_write(data).is_ok()
    }

    /// Like [`write`](Self::write), reporting why the bytes were refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the socket is not open or the
    /// event loop has already torn down.
    pub fn try_write(&self, data: impl Into<Bytes>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }

        let guard = self.command_tx.lock();
        let tx = guard.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(SocketCommand::Write(data.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Requests a graceful close if the socket is open.
    pub fn end(&self) {
        if self.is_connected() && self.ready_state() != ReadyState::Closed {
            self.request_close();
        }
    }

    /// Requests a close regardless of state.
    pub fn destroy(&self) {
        self.request_close();
    }

    fn request_close(&self) {
        if let Some(tx) = self.command_tx.lock().as_ref() {
            let _ = tx.send(SocketCommand::Close);
        }
    }
}

// ============================================================================
// PostgresWs - Accessors
// ============================================================================

impl PostgresWs {
    /// Returns `true` while the WebSocket is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Current protocol-level ready state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.shared.pipeline.lock().ready_state()
    }

    /// Number of queued write groups, in-flight head included.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pipeline.lock().pending_len()
    }

    /// Returns `true` while probing is suppressed after a failed transaction.
    #[inline]
    #[must_use]
    pub fn is_heartbeat_suppressed(&self) -> bool {
        self.shared.pipeline.lock().is_heartbeat_suppressed()
    }

    /// Endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> String {
        self.config.url()
    }

    /// Configuration this socket was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.config
    }
}

// ============================================================================
// PostgresWs - Events
// ============================================================================

impl PostgresWs {
    /// Registers a listener for inbound bytes.
    pub fn on_data<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.shared.emitter.register(
            Some(EventKind::Data),
            Arc::new(move |event: &SocketEvent| {
                if let SocketEvent::Data(bytes) = event {
                    handler(bytes);
                }
            }),
        );
        self
    }

    /// Registers a listener for socket errors.
    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.shared.emitter.register(
            Some(EventKind::Error),
            Arc::new(move |event: &SocketEvent| {
                if let SocketEvent::Error(err) = event {
                    handler(err);
                }
            }),
        );
        self
    }

    /// Registers a listener for close.
    pub fn on_close<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.emitter.register(
            Some(EventKind::Close),
            Arc::new(move |event: &SocketEvent| {
                if matches!(event, SocketEvent::Close) {
                    handler();
                }
            }),
        );
        self
    }

    /// Registers a listener for every event.
    pub fn on_event<F>(&self, handler: F) -> &Self
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.shared.emitter.register(None, Arc::new(handler));
        self
    }
}

// ============================================================================
// PostgresWs - Stream Surface
// ============================================================================

/// Accepted and ignored; PostgreSQL clients call these on their sockets.
impl PostgresWs {
    /// No-op.
    #[inline]
    pub fn set_keep_alive(&self, _enable: bool) -> &Self {
        self
    }

    /// No-op.
    #[inline]
    pub fn pause(&self) -> &Self {
        self
    }

    /// No-op.
    #[inline]
    pub fn resume(&self) -> &Self {
        self
    }

    /// No-op.
    #[inline]
    pub fn cork(&self) -> &Self {
        self
    }

    /// No-op.
    #[inline]
    pub fn uncork(&self) -> &Self {
        self
    }
}

// ============================================================================
// EventLoop
// ============================================================================

struct EventLoop {
    config: Arc<WsConfig>,
    shared: Arc<Shared>,
    /// `None` once the socket is gone.
    sink: Option<WsSink>,
    probe_deadline: Option<Instant>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut source: WsSource,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    ) {
        self.send_startup().await;

        let handshake_started = loop {
            tokio::select! {
                message = source.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => self.handle_frame(data).await,

                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(Bytes::copy_from_slice(text.as_bytes())).await;
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break true;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            self.emit_error(e.to_string());
                            break false;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break false;
                        }

                        // Ignore Ping, Pong, raw frames
                        Some(Ok(_)) => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Write(data)) => {
                            let actions = self.shared.pipeline.lock().write(data);
                            self.perform(actions).await;
                        }

                        Some(SocketCommand::Close) => {
                            debug!("Close requested");
                            break self.close_socket(None).await;
                        }

                        None => {
                            debug!("Socket handle dropped");
                            break self.close_socket(None).await;
                        }
                    }
                }

                () = wait_for(self.probe_deadline) => {
                    self.probe_deadline = None;
                    let timed_out = self.shared.pipeline.lock().on_probe_timeout();
                    if timed_out {
                        let err = Error::liveness_timeout(
                            self.config.heartbeat_timeout.as_millis() as u64,
                        );
                        warn!(error = %err, "Liveness probe unanswered, closing");
                        break self.close_socket(Some(err.to_string())).await;
                    }
                }
            }
        };

        if handshake_started {
            finish_close_handshake(&mut source).await;
        }
        self.teardown();
    }

    async fn send_startup(&mut self) {
        let startup = self.config.startup_message().encode();
        match self.send_frame(startup).await {
            Ok(()) => debug!(user = %self.config.user, database = %self.config.database, "Startup sent"),
            Err(e) => self.report(e),
        }
    }

    async fn handle_frame(&mut self, data: Bytes) {
        trace!(len = data.len(), "Frame received");
        let actions = self.shared.pipeline.lock().on_inbound(data);
        self.perform(actions).await;
    }

    async fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(payload) => {
                    if let Err(e) = self.send_frame(payload).await {
                        self.report(e);
                    }
                }
                Action::Forward(bytes) => self.shared.emitter.emit(SocketEvent::Data(bytes)),
                Action::ArmProbeTimer => {
                    debug!(timeout = ?self.config.heartbeat_timeout, "Liveness watchdog armed");
                    self.probe_deadline = Some(Instant::now() + self.config.heartbeat_timeout);
                }
                Action::CancelProbeTimer => {
                    self.probe_deadline = None;
                }
            }
        }
    }

    /// Sends one binary frame.
    async fn send_frame(&mut self, payload: Bytes) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::TransportNotInitialized)?;
        sink.send(Message::Binary(payload)).await?;
        Ok(())
    }

    fn report(&self, err: Error) {
        match err {
            Error::WebSocket(e) => {
                warn!(error = %e, "WebSocket send failed");
                self.emit_error(e.to_string());
            }
            other => {
                error!(error = %other, "Transport invariant violated");
                self.shared.emitter.emit(SocketEvent::Error(other));
            }
        }
    }

    fn emit_error(&self, message: String) {
        self.shared.emitter.emit(SocketEvent::Error(Error::socket(
            message,
            self.config.host.as_str(),
            self.config.port,
        )));
    }

    /// Sends a Close frame. Returns `true` if it went out.
    async fn close_socket(&mut self, reason: Option<String>) -> bool {
        let Some(mut sink) = self.sink.take() else {
            return false;
        };

        let frame = reason.map(|reason| CloseFrame {
            code: CloseCode::Normal,
            reason: reason.into(),
        });
        match sink.send(Message::Close(frame)).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Failed to send close frame");
                false
            }
        }
    }

    fn teardown(mut self) {
        self.sink = None;
        self.probe_deadline = None;

        let discarded = self.shared.pipeline.lock().close();
        self.shared.connected.store(false, Ordering::SeqCst);

        info!(
            host = %self.config.host,
            port = self.config.port,
            discarded,
            unclaimed_events = self.shared.emitter.held(),
            "WebSocket closed"
        );

        self.shared.emitter.emit(SocketEvent::Close);

        if let Some(callback) = &self.config.on_reserved_connection_close {
            callback(self.config.connection_id.as_ref());
        }
    }
}

/// Reads until the peer's Close reply (or ours) is through.
///
/// Reading also flushes the reply tungstenite queues for a remote Close.
async fn finish_close_handshake(source: &mut WsSource) {
    let finished = timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
        while let Some(Ok(message)) = source.next().await {
            trace!(?message, "Frame after close");
        }
    })
    .await;

    if finished.is_err() {
        debug!(timeout = ?CLOSE_HANDSHAKE_TIMEOUT, "Closing handshake not completed");
    }
}

/// Resolves at `deadline`, or never.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::time::sleep;

    use crate::config::ConnectionId;
    use crate::protocol::fixtures::{command_complete, data_row, ready_for_query};
    use crate::protocol::{StartupMessage, liveness_probe, simple_query};

    type ServerStream = WebSocketStream<TcpStream>;

    const STEP: Duration = Duration::from_secs(2);

    async fn connected_pair(configure: impl FnOnce(WsConfig) -> WsConfig) -> (PostgresWs, ServerStream) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();

        let config = configure(WsConfig::new("127.0.0.1").with_port(port).with_tls(false));
        let socket = PostgresWs::new(config);

        let accept = async {
            let (stream, _) = listener.accept().await.expect("accept should succeed");
            tokio_tungstenite::accept_async(stream)
                .await
                .expect("upgrade should succeed")
        };

        let (connected, server) = tokio::join!(socket.connect(), accept);
        connected.expect("connect should succeed");
        (socket, server)
    }

    async fn recv_binary(server: &mut ServerStream) -> Bytes {
        loop {
            let message = timeout(STEP, server.next())
                .await
                .expect("frame should arrive")
                .expect("stream should be open")
                .expect("frame should be valid");
            if let Message::Binary(bytes) = message {
                return bytes;
            }
        }
    }

    async fn send(server: &mut ServerStream, bytes: Bytes) {
        server
            .send(Message::Binary(bytes))
            .await
            .expect("server send should succeed");
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(STEP, async {
            while !condition() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition should hold in time");
    }

    fn collect_data(socket: &PostgresWs) -> Arc<Mutex<Vec<u8>>> {
        let data = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&data);
        socket.on_data(move |bytes| sink.lock().extend_from_slice(bytes));
        data
    }

    #[tokio::test]
    async fn test_write_before_connect_returns_false() {
        let socket = PostgresWs::new(WsConfig::new("127.0.0.1"));
        assert!(!socket.write(simple_query("SELECT 1")));
        assert!(matches!(
            socket.try_write(simple_query("SELECT 1")),
            Err(Error::ConnectionClosed)
        ));
        assert_eq!(socket.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let socket = PostgresWs::new(WsConfig::new("127.0.0.1").with_port(port).with_tls(false));
        let err = socket.connect().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!socket.is_connected());
    }

    #[tokio::test]
    async fn test_startup_is_first_frame() {
        let (socket, mut server) = connected_pair(|c| {
            c.with_user("alice")
                .with_database("orders")
                .with_client_encoding("UTF8")
        })
        .await;

        let startup = StartupMessage::decode(&recv_binary(&mut server).await)
            .expect("startup should decode");
        assert_eq!(startup.param("user"), Some("alice"));
        assert_eq!(startup.param("database"), Some("orders"));
        assert_eq!(startup.param("client_encoding"), Some("UTF8"));

        assert!(socket.is_connected());
        assert_eq!(socket.ready_state(), ReadyState::Open);
        assert!(socket.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_check_is_transparent() {
        let (socket, mut server) = connected_pair(|c| c).await;
        recv_binary(&mut server).await;
        let data = collect_data(&socket);

        let query = simple_query("SELECT 1");
        assert!(socket.write(query.clone()));
        assert_eq!(recv_binary(&mut server).await, query);
        assert_eq!(socket.pending_count(), 0);

        let reply = ready_for_query(b'I');
        send(&mut server, reply.slice(..2)).await;
        send(&mut server, reply.slice(2..)).await;

        wait_until(|| data.lock().len() == reply.len()).await;
        assert_eq!(&data.lock()[..], &reply[..]);
    }

    #[tokio::test]
    async fn test_events_before_listener_are_replayed() {
        let (socket, mut server) = connected_pair(|c| c).await;
        recv_binary(&mut server).await;

        let greeting = ready_for_query(b'I');
        send(&mut server, greeting.clone()).await;
        sleep(Duration::from_millis(50)).await;

        let data = collect_data(&socket);
        wait_until(|| data.lock().len() == greeting.len()).await;
    }

    #[tokio::test]
    async fn test_probe_then_query_round_trip() {
        let (socket, mut server) = connected_pair(|c| c.with_connection_check(true)).await;
        recv_binary(&mut server).await;
        let data = collect_data(&socket);

        let query = simple_query("SELECT 1");
        assert!(socket.write(query.clone()));

        assert_eq!(recv_binary(&mut server).await, liveness_probe());
        send(&mut server, data_row("1")).await;
        send(&mut server, command_complete("SELECT 1")).await;
        send(&mut server, ready_for_query(b'I')).await;

        assert_eq!(recv_binary(&mut server).await, query);
        assert_eq!(socket.ready_state(), ReadyState::Querying);
        assert!(data.lock().is_empty());

        let row = data_row("1");
        let ready = ready_for_query(b'I');
        send(&mut server, row.clone()).await;
        send(&mut server, ready.clone()).await;

        wait_until(|| socket.ready_state() == ReadyState::Open && socket.pending_count() == 0)
            .await;
        let mut expected = row.to_vec();
        expected.extend_from_slice(&ready);
        assert_eq!(*data.lock(), expected);
    }

    #[tokio::test]
    async fn test_second_write_held_until_first_acknowledged() {
        let (socket, mut server) = connected_pair(|c| c.with_connection_check(true)).await;
        recv_binary(&mut server).await;

        let first = simple_query("SELECT 1");
        let second = simple_query("SELECT 2");
        assert!(socket.write(first.clone()));
        assert!(socket.write(second.clone()));

        assert_eq!(recv_binary(&mut server).await, liveness_probe());
        send(&mut server, data_row("1")).await;
        send(&mut server, ready_for_query(b'I')).await;
        assert_eq!(recv_binary(&mut server).await, first);

        assert!(
            timeout(Duration::from_millis(200), server.next())
                .await
                .is_err(),
            "second write must wait for the first ready-for-query"
        );

        send(&mut server, ready_for_query(b'I')).await;
        assert_eq!(recv_binary(&mut server).await, second);
    }

    #[tokio::test]
    async fn test_liveness_timeout_forces_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        let reserved = Arc::new(Mutex::new(None));

        let reserved_sink = Arc::clone(&reserved);
        let (socket, mut server) = connected_pair(move |c| {
            c.with_connection_check(true)
                .with_heartbeat_timeout(Duration::from_millis(100))
                .with_connection_id(ConnectionId::new("conn-7"))
                .with_on_reserved_connection_close(move |id| {
                    *reserved_sink.lock() = id.map(|id| id.to_string());
                })
        })
        .await;
        recv_binary(&mut server).await;

        let close_count = Arc::clone(&closes);
        socket.on_close(move || {
            close_count.fetch_add(1, Ordering::SeqCst);
        });

        assert!(socket.write(simple_query("SELECT 1")));
        assert_eq!(recv_binary(&mut server).await, liveness_probe());

        let close = timeout(STEP, server.next())
            .await
            .expect("close should arrive")
            .expect("stream should be open")
            .expect("frame should be valid");
        match close {
            Message::Close(Some(frame)) => assert!(frame.reason.contains("Heartbeat timeout")),
            other => panic!("expected close frame, got {other:?}"),
        }
        let _ = timeout(STEP, server.next()).await;

        wait_until(|| !socket.is_connected()).await;
        wait_until(|| closes.load(Ordering::SeqCst) == 1).await;
        assert_eq!(socket.ready_state(), ReadyState::Closed);
        assert_eq!(socket.pending_count(), 0);
        assert_eq!(reserved.lock().as_deref(), Some("conn-7"));
        assert!(!socket.write(simple_query("SELECT 2")));
    }

    #[tokio::test]
    async fn test_end_closes_gracefully() {
        let (socket, mut server) = connected_pair(|c| c).await;
        recv_binary(&mut server).await;

        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);
        socket.on_close(move || flag.store(true, Ordering::SeqCst));

        let started = Instant::now();
        socket.end();

        let message = timeout(STEP, server.next()).await.expect("close should arrive");
        assert!(matches!(message, Some(Ok(Message::Close(_)))));

        // Reading flushes the server's close reply
        let after = timeout(STEP, server.next()).await.expect("stream should finish");
        assert!(!matches!(after, Some(Ok(Message::Binary(_)))));

        wait_until(|| closed.load(Ordering::SeqCst)).await;
        assert!(!socket.is_connected());
        assert!(started.elapsed() < CLOSE_HANDSHAKE_TIMEOUT);

        socket.end();
        socket.destroy();
    }

    #[tokio::test]
    async fn test_remote_close_tears_down() {
        let (socket, mut server) = connected_pair(|c| c.with_connection_check(true)).await;
        recv_binary(&mut server).await;

        assert!(socket.write(simple_query("SELECT 1")));
        recv_binary(&mut server).await;
        server.close(None).await.expect("server close should succeed");

        let reply = timeout(STEP, server.next()).await.expect("close reply should arrive");
        assert!(matches!(reply, Some(Ok(Message::Close(_)))));

        wait_until(|| !socket.is_connected()).await;
        assert_eq!(socket.ready_state(), ReadyState::Closed);
        assert_eq!(socket.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_emits_error_then_close() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reserved = Arc::new(AtomicUsize::new(0));

        let reserved_count = Arc::clone(&reserved);
        let (socket, mut server) = connected_pair(move |c| {
            c.with_connection_id(ConnectionId::new("conn-9"))
                .with_on_reserved_connection_close(move |id| {
                    assert_eq!(id.map(ConnectionId::as_str), Some("conn-9"));
                    reserved_count.fetch_add(1, Ordering::SeqCst);
                })
        })
        .await;
        recv_binary(&mut server).await;

        let error_sink = Arc::clone(&errors);
        let close_flag = Arc::clone(&closed);
        socket
            .on_error(move |e| error_sink.lock().push(e.to_string()))
            .on_close(move || close_flag.store(true, Ordering::SeqCst));

        drop(server);

        wait_until(|| closed.load(Ordering::SeqCst)).await;
        let expected_suffix = format!("127.0.0.1:{}", socket.config().port);
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0].ends_with(&expected_suffix),
            "error should name the endpoint: {}",
            errors[0]
        );
        assert!(!socket.is_connected());
        assert_eq!(reserved.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_surface_is_chainable() {
        let socket = PostgresWs::new(WsConfig::new("127.0.0.1"));
        socket
            .set_keep_alive(true)
            .pause()
            .resume()
            .cork()
            .uncork();
        assert_eq!(socket.url(), "wss://127.0.0.1:443");
    }
}
