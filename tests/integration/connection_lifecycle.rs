// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Connection manager lifecycle against real sockets.
//!
//! Covers the state machine (Disconnected → Connecting → Connected →
//! Disconnected), the `get_tasks`-first guarantee, send gating, and
//! release on disconnect and drop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tasksync::connection::{
    ConnectionError, ConnectionManager, ConnectionState, FrameHandler,
};
use tasksync_proto::{Action, codec};
use tasksync_server::server::{ServerState, start_server_with_state};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Frames(Mutex<Vec<String>>);

impl FrameHandler for Frames {
    fn handle_frame(&self, frame: &str) {
        self.0.lock().push(frame.to_string());
    }
}

/// Accepts one WebSocket client and forwards every text frame it sends.
async fn recording_backend() -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = tx.send(text.to_string());
            }
        }
    });

    (format!("http://{addr}/"), rx)
}

async fn start_backend() -> (Arc<ServerState>, String) {
    let state = Arc::new(ServerState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (state, format!("http://{addr}/"))
}

async fn wait_for_connections(state: &ServerState, expected: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while state.connection_count().await != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {expected} backend connections"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn get_tasks_precedes_every_user_frame() {
    let (base, mut frames) = recording_backend().await;
    let mut manager = ConnectionManager::from_base(&base, WAIT).unwrap();
    manager.connect(Arc::new(Frames::default())).await.unwrap();

    manager.send(&Action::add_task("Buy milk").unwrap()).unwrap();
    manager.send(&Action::toggle_task("t1")).unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        let frame = tokio::time::timeout(WAIT, frames.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(codec::decode_action(&frame).unwrap());
    }
    assert_eq!(
        received,
        vec![
            Action::GetTasks,
            Action::add_task("Buy milk").unwrap(),
            Action::toggle_task("t1"),
        ]
    );
}

#[tokio::test]
async fn state_transitions_are_published() {
    let (_state, base) = start_backend().await;
    let mut manager = ConnectionManager::from_base(&base, WAIT).unwrap();
    let rx = manager.subscribe();
    assert_eq!(*rx.borrow(), ConnectionState::Disconnected);

    manager.connect(Arc::new(Frames::default())).await.unwrap();
    assert_eq!(*rx.borrow(), ConnectionState::Connected);

    manager.disconnect().await;
    assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn first_inbound_frame_is_the_overview() {
    let (_state, base) = start_backend().await;
    let frames = Arc::new(Frames::default());
    let mut manager = ConnectionManager::from_base(&base, WAIT).unwrap();
    manager.connect(frames.clone()).await.unwrap();

    let deadline = tokio::time::Instant::now() + WAIT;
    while frames.0.lock().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "no overview received");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let first = frames.0.lock()[0].clone();
    assert_eq!(first, r#"{"type":"tasks_overview","tasks":[]}"#);
}

#[tokio::test]
async fn send_before_connect_produces_no_frame() {
    let (base, mut frames) = recording_backend().await;
    let mut manager = ConnectionManager::from_base(&base, WAIT).unwrap();

    assert!(matches!(
        manager.send(&Action::add_task("early").unwrap()),
        Err(ConnectionError::NotConnected)
    ));

    manager.connect(Arc::new(Frames::default())).await.unwrap();
    let first = tokio::time::timeout(WAIT, frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, r#"{"action":"get_tasks"}"#);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), frames.recv())
            .await
            .is_err(),
        "the early action must not be replayed"
    );
}

#[tokio::test]
async fn second_connect_is_rejected_without_opening_a_socket() {
    let (state, base) = start_backend().await;
    let mut manager = ConnectionManager::from_base(&base, WAIT).unwrap();
    manager.connect(Arc::new(Frames::default())).await.unwrap();
    wait_for_connections(&state, 1).await;

    let result = manager.connect(Arc::new(Frames::default())).await;
    assert!(matches!(result, Err(ConnectionError::AlreadyConnected)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.connection_count().await, 1);
}

#[tokio::test]
async fn unreachable_backend_reports_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut manager = ConnectionManager::from_base(&format!("http://{addr}/"), WAIT).unwrap();
    let result = manager.connect(Arc::new(Frames::default())).await;

    assert!(matches!(result, Err(ConnectionError::Unreachable(_))));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_releases_backend_connection() {
    let (state, base) = start_backend().await;
    let mut manager = ConnectionManager::from_base(&base, WAIT).unwrap();
    manager.connect(Arc::new(Frames::default())).await.unwrap();
    wait_for_connections(&state, 1).await;

    manager.disconnect().await;
    wait_for_connections(&state, 0).await;
    assert!(matches!(
        manager.send(&Action::GetTasks),
        Err(ConnectionError::NotConnected)
    ));
}

#[tokio::test]
async fn drop_releases_backend_connection() {
    let (state, base) = start_backend().await;
    let mut manager = ConnectionManager::from_base(&base, WAIT).unwrap();
    manager.connect(Arc::new(Frames::default())).await.unwrap();
    wait_for_connections(&state, 1).await;

    drop(manager);
    wait_for_connections(&state, 0).await;
}
