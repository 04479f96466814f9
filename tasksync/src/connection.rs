//! Connection manager: the single WebSocket link to the backend.
//!
//! [`ConnectionManager`] owns the live connection and the three-valued
//! [`ConnectionState`]. Its lifecycle is explicit:
//!
//! ```text
//! Disconnected --connect()--> Connecting --handshake ok--> Connected
//!      ^                          |                           |
//!      +------- handshake failed -+--- close / error / disconnect()
//! ```
//!
//! Entering `Connected` queues a `get_tasks` action before anything else can
//! be sent, so every connection starts with a fresh snapshot. There is no
//! automatic reconnect; callers decide when to call [`ConnectionManager::connect`]
//! again.
//!
//! Sends are fire-and-forget. [`ConnectionManager::send`] hands the encoded
//! frame to a writer task and returns immediately; while not connected it
//! logs a warning and drops the action (never queued, never retried).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tasksync_proto::Action;
use tasksync_proto::codec::{self, CodecError};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Path of the WebSocket endpoint, relative to the client's base URL.
pub const WS_PATH: &str = "ws";

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `disconnect()` waits for the close frame to be flushed.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle status of the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection. Initial state.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connection open; actions may be sent.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Errors returned by connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// An action was attempted while not connected.
    #[error("not connected")]
    NotConnected,

    /// `connect()` was called while a connection is open or opening.
    #[error("a connection is already open or opening")]
    AlreadyConnected,

    /// The handshake did not complete in time.
    #[error("connection attempt timed out")]
    Timeout,

    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The base URL could not be turned into a WebSocket endpoint.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Any other WebSocket failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// An action could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Receives inbound text frames, in arrival order, from the reader task.
///
/// Implementations must not panic on bad input; a malformed frame is their
/// problem to log and drop.
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one inbound text frame.
    fn handle_frame(&self, frame: &str);
}

/// Derives the WebSocket endpoint from the client's base URL.
///
/// `http` becomes `ws` and `https` becomes `wss` (`ws`/`wss` pass through).
/// [`WS_PATH`] is appended to the base path; query and fragment are dropped.
///
/// ```
/// # use tasksync::connection::endpoint_from_base;
/// let url = endpoint_from_base("https://example.com/todo/").unwrap();
/// assert_eq!(url.as_str(), "wss://example.com/todo/ws");
/// ```
///
/// # Errors
///
/// Returns [`ConnectionError::InvalidUrl`] if `base` does not parse or uses
/// a scheme other than `http`, `https`, `ws`, or `wss`.
pub fn endpoint_from_base(base: &str) -> Result<Url, ConnectionError> {
    let mut url =
        Url::parse(base).map_err(|e| ConnectionError::InvalidUrl(format!("{base}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectionError::InvalidUrl(format!(
                "{base}: unsupported scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ConnectionError::InvalidUrl(format!("{base}: cannot use scheme {scheme}")))?;

    let path = if url.path().ends_with('/') {
        format!("{}{WS_PATH}", url.path())
    } else {
        format!("{}/{WS_PATH}", url.path())
    };
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// State shared between the manager and its background tasks.
///
/// `epoch` identifies the current link. Tasks from an older link compare
/// their epoch before touching `state`, so a late-exiting stale reader can
/// never mark a newer connection as disconnected.
struct Shared {
    state: watch::Sender<ConnectionState>,
    epoch: AtomicU64,
}

impl Shared {
    fn mark_disconnected(&self, epoch: u64) {
        if self.epoch.load(Ordering::Acquire) == epoch {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// Armed while a `connect()` is between `Connecting` and `Connected`.
///
/// Dropping it uncommitted moves that attempt's epoch back to
/// `Disconnected`, which covers both error returns and a cancelled future.
struct PendingConnect {
    shared: Arc<Shared>,
    epoch: u64,
    committed: bool,
}

impl PendingConnect {
    const fn new(shared: Arc<Shared>, epoch: u64) -> Self {
        Self {
            shared,
            epoch,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingConnect {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!(epoch = self.epoch, "connect attempt abandoned");
            self.shared.mark_disconnected(self.epoch);
        }
    }
}

/// One open connection: the outbound queue and the two pump tasks.
struct Link {
    outbound: mpsc::UnboundedSender<Message>,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

impl Link {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Owner of the single backend connection and its [`ConnectionState`].
///
/// Dropping the manager releases any open connection.
pub struct ConnectionManager {
    endpoint: Url,
    connect_timeout: Duration,
    shared: Arc<Shared>,
    link: Option<Link>,
}

impl ConnectionManager {
    /// Creates a disconnected manager for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Url, connect_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint,
            connect_timeout,
            shared: Arc::new(Shared {
                state,
                epoch: AtomicU64::new(0),
            }),
            link: None,
        }
    }

    /// Creates a disconnected manager for the endpoint derived from `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidUrl`] if `base` is not usable.
    pub fn from_base(base: &str, connect_timeout: Duration) -> Result<Self, ConnectionError> {
        Ok(Self::new(endpoint_from_base(base)?, connect_timeout))
    }

    /// The WebSocket endpoint this manager connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Whether actions can currently be sent.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to connection state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Opens the connection and starts delivering inbound frames to `handler`.
    ///
    /// On success the state is `Connected` and a `get_tasks` action is already
    /// queued ahead of anything the caller sends.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::AlreadyConnected`] unless currently `Disconnected`.
    /// - [`ConnectionError::Timeout`] if the handshake exceeds the timeout.
    /// - [`ConnectionError::Unreachable`] / [`ConnectionError::Transport`] if
    ///   the handshake fails.
    ///
    /// Every error except `AlreadyConnected` leaves the state `Disconnected`.
    pub async fn connect(&mut self, handler: Arc<dyn FrameHandler>) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Disconnected {
            return Err(ConnectionError::AlreadyConnected);
        }
        self.release();

        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.state.send_replace(ConnectionState::Connecting);
        // Any early return, or this future being dropped, lands back in
        // Disconnected.
        let pending = PendingConnect::new(Arc::clone(&self.shared), epoch);
        tracing::info!(url = %self.endpoint, "connecting to backend");

        let handshake = connect_async(self.endpoint.as_str());
        let ws_stream = match tokio::time::timeout(self.connect_timeout, handshake).await {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                tracing::warn!(url = %self.endpoint, err = %e, "WebSocket connect failed");
                return Err(map_ws_connect_error(e));
            }
            Err(_) => {
                tracing::warn!(url = %self.endpoint, "WebSocket connect timed out");
                return Err(ConnectionError::Timeout);
            }
        };

        let (ws_sender, ws_reader) = ws_stream.split();
        let (outbound, rx) = mpsc::unbounded_channel();

        // The snapshot request goes in first, before the state flips and
        // before any caller can queue its own frame.
        let refresh = codec::encode_action(&Action::GetTasks)?;
        if outbound.send(Message::Text(refresh.into())).is_err() {
            tracing::warn!("outbound queue closed, initial get_tasks dropped");
        }

        let writer = tokio::spawn(writer_loop(
            ws_sender,
            rx,
            Arc::clone(&self.shared),
            epoch,
        ));
        self.shared.state.send_replace(ConnectionState::Connected);
        let reader = tokio::spawn(reader_loop(
            ws_reader,
            handler,
            Arc::clone(&self.shared),
            epoch,
        ));

        self.link = Some(Link {
            outbound,
            reader,
            writer,
        });
        pending.commit();
        tracing::info!(url = %self.endpoint, "connected to backend");
        Ok(())
    }

    /// Sends one action to the backend without waiting.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::NotConnected`] if the state is not `Connected`;
    ///   nothing is sent and a warning is logged.
    /// - [`ConnectionError::Codec`] if the action cannot be encoded.
    pub fn send(&self, action: &Action) -> Result<(), ConnectionError> {
        let link = match &self.link {
            Some(link) if self.is_connected() => link,
            _ => {
                tracing::warn!(
                    action = action.name(),
                    state = %self.state(),
                    "not connected, action dropped"
                );
                return Err(ConnectionError::NotConnected);
            }
        };

        let frame = codec::encode_action(action)?;
        link.outbound.send(Message::Text(frame.into())).map_err(|_| {
            tracing::warn!(action = action.name(), "writer gone, action dropped");
            self.shared.mark_disconnected(self.shared.epoch.load(Ordering::Acquire));
            ConnectionError::NotConnected
        })?;
        tracing::debug!(action = action.name(), "action queued");
        Ok(())
    }

    /// Closes the connection, if any, and moves to `Disconnected`.
    ///
    /// When connected, a close frame is sent and given a short time to flush
    /// before the background tasks are stopped.
    pub async fn disconnect(&mut self) {
        let Some(mut link) = self.link.take() else {
            self.invalidate();
            return;
        };

        if self.is_connected() && link.outbound.send(Message::Close(None)).is_ok() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut link.writer)
                .await
                .is_err()
            {
                tracing::debug!("close frame not flushed in time");
            }
            tracing::info!(url = %self.endpoint, "disconnected from backend");
        }

        link.abort();
        self.invalidate();
    }

    /// Stops any stale link left behind by a remote close.
    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            link.abort();
        }
    }

    /// Retires the current epoch and publishes `Disconnected`.
    fn invalidate(&self) {
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        self.shared.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.abort();
            self.invalidate();
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Background task draining the outbound queue into the socket.
async fn writer_loop(
    mut ws_sender: WsSender,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
    epoch: u64,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = ws_sender.send(msg).await {
            tracing::warn!(err = %e, "WebSocket send failed");
            shared.mark_disconnected(epoch);
            return;
        }
        if closing {
            return;
        }
    }
}

/// Background task reading the socket and handing text frames to `handler`.
///
/// Non-text frames are ignored. Marks the connection disconnected when the
/// socket closes or errors.
async fn reader_loop(
    mut ws_reader: WsReader,
    handler: Arc<dyn FrameHandler>,
    shared: Arc<Shared>,
    epoch: u64,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => handler.handle_frame(text.as_str()),
            Ok(Message::Binary(data)) => {
                tracing::warn!(len = data.len(), "ignoring binary frame");
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "WebSocket closed by backend");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    shared.mark_disconnected(epoch);
    tracing::info!("reader task exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`ConnectionError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> ConnectionError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => ConnectionError::Unreachable(io_err.to_string()),
        WsError::Tls(_) => ConnectionError::Transport(format!("TLS error: {err}")),
        WsError::Http(response) => {
            ConnectionError::Transport(format!("HTTP error: status {}", response.status()))
        }
        WsError::Url(e) => ConnectionError::InvalidUrl(e.to_string()),
        other => ConnectionError::Transport(other.to_string()),
    }
}
