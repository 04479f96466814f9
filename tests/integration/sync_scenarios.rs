// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! End-to-end sync scenarios against the reference backend.
//!
//! Each test starts `tasksync-server` in-process on `127.0.0.1:0`, wires a
//! [`SyncClient`] to an in-memory store and drives it through the public
//! intent API, observing only the store and the connection state.

use std::sync::Arc;
use std::time::Duration;

use ratatui::{Terminal, backend::TestBackend};
use tasksync::app::App;
use tasksync::connection::{ConnectionError, ConnectionManager, ConnectionState};
use tasksync::store::TaskStore;
use tasksync::sync::{IntentError, SyncClient};
use tasksync::ui;
use tasksync_proto::{ProtocolError, Task};
use tasksync_server::board::TaskBoard;
use tasksync_server::server::{ServerState, start_server_with_state};

const WAIT: Duration = Duration::from_secs(5);

/// Starts a backend holding `tasks` and returns a connected client.
async fn connected_client(tasks: Vec<Task>) -> (Arc<ServerState>, SyncClient) {
    let state = Arc::new(ServerState::with_board(TaskBoard::with_tasks(tasks)));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    let connection = ConnectionManager::from_base(&format!("http://{addr}/"), WAIT).unwrap();
    let mut client = SyncClient::new(Arc::new(TaskStore::in_memory()), connection);
    client.connect().await.unwrap();
    wait_for_revision(client.store(), 1).await;
    (state, client)
}

/// Waits until the store has applied at least `revision` snapshots.
async fn wait_for_revision(store: &TaskStore, revision: u64) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while store.revision() < revision {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for revision {revision}, at {}",
            store.revision()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn screen(app: &App) -> String {
    let mut terminal = Terminal::new(TestBackend::new(80, 10)).unwrap();
    terminal.draw(|frame| ui::draw(frame, app)).unwrap();
    let buffer = terminal.backend().buffer();
    let mut out = String::new();
    for y in 0..buffer.area.height {
        for x in 0..buffer.area.width {
            out.push_str(buffer[(x, y)].symbol());
        }
        out.push('\n');
    }
    out
}

#[tokio::test]
async fn connect_to_empty_backend_shows_no_tasks() {
    let (_server, client) = connected_client(Vec::new()).await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.store().tasks().is_empty());

    let mut app = App::default();
    app.sync_from(client.store(), client.state());
    let rendered = screen(&app);
    assert!(rendered.contains("No tasks yet."));
    assert!(rendered.contains("Connected"));
}

#[tokio::test]
async fn add_task_replaces_list_with_backend_snapshot() {
    let (server, client) = connected_client(Vec::new()).await;

    client.add_task("Buy milk").unwrap();
    wait_for_revision(client.store(), 2).await;

    let tasks = client.store().tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Buy milk");
    assert!(!tasks[0].completed);
    assert_eq!(tasks, server.board.snapshot().await);
}

#[tokio::test]
async fn toggle_task_marks_it_completed() {
    let (_server, client) = connected_client(vec![Task::new("t1", "Buy milk")]).await;
    assert_eq!(client.store().tasks(), vec![Task::new("t1", "Buy milk")]);

    client.toggle_task("t1").unwrap();
    wait_for_revision(client.store(), 2).await;

    assert_eq!(
        client.store().tasks(),
        vec![Task::new("t1", "Buy milk").with_completed(true)]
    );
}

#[tokio::test]
async fn toggle_twice_restores_original_flag() {
    let (_server, client) = connected_client(vec![Task::new("t1", "Buy milk")]).await;

    client.toggle_task("t1").unwrap();
    client.toggle_task("t1").unwrap();
    wait_for_revision(client.store(), 3).await;

    assert_eq!(client.store().tasks(), vec![Task::new("t1", "Buy milk")]);
}

#[tokio::test]
async fn empty_add_is_never_sent() {
    let (server, client) = connected_client(Vec::new()).await;

    let result = client.add_task("");
    assert!(matches!(
        result,
        Err(IntentError::Protocol(ProtocolError::EmptyText))
    ));

    // A refresh round-trip proves nothing else was queued ahead of it.
    client.refresh().unwrap();
    wait_for_revision(client.store(), 2).await;
    assert!(client.store().tasks().is_empty());
    assert!(server.board.snapshot().await.is_empty());
}

#[tokio::test]
async fn closed_connection_blocks_intents_and_keeps_list() {
    let (server, client) = connected_client(vec![Task::new("t1", "Buy milk")]).await;
    let mut state_rx = client.connection().subscribe();

    server.close_all_connections().await;
    tokio::time::timeout(
        WAIT,
        state_rx.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .expect("client never noticed the close")
    .unwrap();

    let revision = client.store().revision();
    let result = client.add_task("Walk dog");
    assert!(matches!(
        result,
        Err(IntentError::Connection(ConnectionError::NotConnected))
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.store().tasks(), vec![Task::new("t1", "Buy milk")]);
    assert_eq!(client.store().revision(), revision);
    assert_eq!(server.board.snapshot().await.len(), 1);
}

#[tokio::test]
async fn reconnect_fetches_fresh_snapshot() {
    let (server, mut client) = connected_client(Vec::new()).await;

    server.close_all_connections().await;
    let mut state_rx = client.connection().subscribe();
    tokio::time::timeout(
        WAIT,
        state_rx.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();

    server.board.add("Added while away").await.unwrap();
    client.connect().await.unwrap();
    wait_for_revision(client.store(), 2).await;

    let tasks = client.store().tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Added while away");
}

#[tokio::test]
async fn backend_list_replaces_restored_snapshot() {
    let state = Arc::new(ServerState::with_board(TaskBoard::with_tasks(vec![
        Task::new("s1", "From server"),
    ])));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    let store = Arc::new(TaskStore::in_memory());
    store.replace_tasks(vec![Task::new("local", "Stale local copy")]);

    let connection = ConnectionManager::from_base(&format!("http://{addr}"), WAIT).unwrap();
    let mut client = SyncClient::new(Arc::clone(&store), connection);
    client.connect().await.unwrap();
    wait_for_revision(&store, 2).await;

    assert_eq!(store.tasks(), vec![Task::new("s1", "From server")]);
}

#[tokio::test]
async fn interactive_connect_reaches_connected() {
    let state = Arc::new(ServerState::with_board(TaskBoard::with_tasks(vec![
        Task::new("s1", "From server"),
    ])));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    let connection = ConnectionManager::from_base(&format!("http://{addr}/"), WAIT).unwrap();
    let mut client = SyncClient::new(Arc::new(TaskStore::in_memory()), connection);
    let mut app = App::default();
    app.connect_interactive(&mut client, Duration::from_millis(10), |_| Ok(()))
        .await
        .unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(app.status_message.as_deref(), Some("Connected"));

    wait_for_revision(client.store(), 1).await;
    app.sync_from(client.store(), client.state());
    let screen = screen(&app);
    assert!(screen.contains("[ ] From server"));
    assert!(screen.contains("● Connected"));
}

#[tokio::test]
async fn persistent_backend_keeps_tasks_across_restart() {
    let dir = std::env::temp_dir().join(format!("tasksync-restart-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let first = Arc::new(ServerState::with_board(TaskBoard::open(&dir).unwrap()));
    let (addr, handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&first))
        .await
        .unwrap();
    let connection = ConnectionManager::from_base(&format!("http://{addr}/"), WAIT).unwrap();
    let mut client = SyncClient::new(Arc::new(TaskStore::in_memory()), connection);
    client.connect().await.unwrap();
    wait_for_revision(client.store(), 1).await;
    client.add_task("Survive restart").unwrap();
    wait_for_revision(client.store(), 2).await;
    client.disconnect().await;
    handle.abort();

    let second = ServerState::with_board(TaskBoard::open(&dir).unwrap());
    let tasks = second.board.snapshot().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Survive restart");

    let _ = std::fs::remove_dir_all(&dir);
}
