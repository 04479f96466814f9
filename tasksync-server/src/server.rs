//! Backend server core: shared state, WebSocket handler, and action dispatch.
//!
//! Each WebSocket connection sends JSON [`Action`] frames. After every
//! successful action the server replies, on that same connection only, with
//! a [`ServerEvent`] carrying the complete current list.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tasksync_proto::codec;
use tasksync_proto::{Action, ServerEvent, Task};
use tokio::sync::{RwLock, mpsc};

use crate::board::TaskBoard;

/// Shared server state holding the task board and the live connection registry.
#[derive(Default)]
pub struct ServerState {
    /// The authoritative task list.
    pub board: TaskBoard,
    /// Connection id -> channel feeding that connection's WebSocket writer.
    connections: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    next_connection_id: AtomicU64,
}

impl ServerState {
    /// Creates a server state with an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server state around an existing board.
    #[must_use]
    pub fn with_board(board: TaskBoard) -> Self {
        Self {
            board,
            ..Self::default()
        }
    }

    /// Registers a connection's writer channel and returns its id.
    async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.connections.write().await.insert(id, sender);
        id
    }

    async fn unregister(&self, id: u64) {
        self.connections.write().await.remove(&id);
    }

    /// Number of currently open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a WebSocket Close frame to every connected client.
    ///
    /// Each writer task forwards the close frame, which makes the client-side
    /// reader observe the disconnect. Used for graceful shutdown and tests.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (id, sender) in conns.iter() {
            tracing::info!(connection = id, "sending close frame to client");
            if sender.send(Message::Close(None)).is_err() {
                tracing::debug!(connection = id, "writer already gone");
            }
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// 1. Register a writer channel for the connection.
/// 2. Spawn a writer task draining that channel into the socket.
/// 3. Read frames, dispatch actions, queue replies.
/// 4. On close or error, tear down both tasks and unregister.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let connection = state.register(tx.clone()).await;
    tracing::info!(connection, "client connected");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = dispatch(connection, text.as_str(), &reader_state).await {
                        queue_event(&tx, &reply);
                    }
                }
                Message::Ping(_) | Message::Pong(_) => {
                    tracing::debug!(connection, "keepalive frame, sending ack");
                    queue_event(&tx, &ServerEvent::Ack);
                }
                Message::Binary(_) => {
                    tracing::error!(connection, "binary frames are not supported");
                }
                Message::Close(_) => {
                    tracing::info!(connection, "received close frame");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(connection).await;
    tracing::info!(connection, "client disconnected");
}

/// Decodes one action frame, applies it to the board, and returns the reply.
///
/// Returns `None` when the frame is malformed or the action is rejected; the
/// client receives nothing in that case.
async fn dispatch(connection: u64, frame: &str, state: &ServerState) -> Option<ServerEvent> {
    let action = match codec::decode_action(frame) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(connection, error = %e, "unrecognized action frame");
            return None;
        }
    };
    tracing::debug!(connection, action = action.name(), "dispatching action");

    match action {
        Action::GetTasks => Some(ServerEvent::TasksOverview {
            tasks: state.board.snapshot().await,
        }),
        Action::AddTask { text } => match state.board.add(&text).await {
            Ok((task, tasks)) => {
                tracing::info!(connection, id = %task.id, "task added");
                Some(ServerEvent::TaskAdded {
                    task: Some(task),
                    tasks,
                })
            }
            Err(e) => {
                tracing::error!(connection, error = %e, "add_task rejected");
                None
            }
        },
        Action::ToggleTask { id } => match state.board.toggle(&id).await {
            Ok((task, tasks)) => {
                tracing::info!(
                    connection,
                    id = %task.id,
                    completed = task.completed,
                    "task toggled"
                );
                Some(ServerEvent::TaskToggled {
                    task: Some(task),
                    tasks,
                })
            }
            Err(e) => {
                tracing::error!(connection, error = %e, "toggle_task rejected");
                None
            }
        },
    }
}

/// Encodes an event and queues it on a connection's writer channel.
fn queue_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) {
    match codec::encode_event(event) {
        Ok(frame) => {
            if tx.send(Message::Text(frame.into())).is_err() {
                tracing::debug!(event = event.kind(), "writer gone, event dropped");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to encode event"),
    }
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with a pre-built [`ServerState`].
///
/// Routes: `GET /ws` (WebSocket), `GET /api` (current list as JSON) and
/// `GET /health`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/api", axum::routing::get(api_tasks))
        .route("/health", axum::routing::get(health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

async fn health() -> &'static str {
    "ok"
}

/// Plain HTTP read of the full list, same payload as a `tasks_overview`.
async fn api_tasks(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> axum::Json<Vec<Task>> {
    axum::Json(state.board.snapshot().await)
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
