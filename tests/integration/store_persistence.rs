// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Snapshot persistence across client restarts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tasksync::connection::ConnectionManager;
use tasksync::store::{FileStorage, SNAPSHOT_KEY, SnapshotStorage, TaskStore};
use tasksync::sync::SyncClient;
use tasksync_proto::Task;
use tasksync_server::board::TaskBoard;
use tasksync_server::server::{ServerState, start_server_with_state};

/// A fresh, unique data directory under the system temp dir.
fn data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "tasksync-it-{name}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn snapshot_survives_restart() {
    let dir = data_dir("restart");

    let first = TaskStore::open(FileStorage::new(&dir));
    assert!(first.is_empty());
    first.replace_tasks(vec![
        Task::new("t1", "Buy milk").with_completed(true),
        Task::new("t2", "Walk dog"),
    ]);
    drop(first);

    let second = TaskStore::open(FileStorage::new(&dir));
    assert_eq!(
        second.tasks(),
        vec![
            Task::new("t1", "Buy milk").with_completed(true),
            Task::new("t2", "Walk dog"),
        ]
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn latest_replace_wins_on_disk() {
    let dir = data_dir("latest");

    let store = TaskStore::open(FileStorage::new(&dir));
    store.replace_tasks(vec![Task::new("t1", "old")]);
    store.replace_tasks(Vec::new());
    drop(store);

    assert!(TaskStore::open(FileStorage::new(&dir)).is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn corrupt_file_starts_empty() {
    let dir = data_dir("corrupt");
    FileStorage::new(&dir)
        .save(SNAPSHOT_KEY, &[0xFF, 0xFF, 0xFF])
        .unwrap();

    let store = TaskStore::open(FileStorage::new(&dir));
    assert!(store.is_empty());

    // The store stays usable and overwrites the bad entry.
    store.replace_tasks(vec![Task::new("t1", "fresh")]);
    drop(store);
    assert_eq!(
        TaskStore::open(FileStorage::new(&dir)).tasks(),
        vec![Task::new("t1", "fresh")]
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn synced_list_is_available_offline_after_restart() {
    let dir = data_dir("offline");
    let state = Arc::new(ServerState::with_board(TaskBoard::with_tasks(vec![
        Task::new("t1", "Buy milk"),
    ])));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();

    {
        let store = Arc::new(TaskStore::open(FileStorage::new(&dir)));
        let connection =
            ConnectionManager::from_base(&format!("http://{addr}/"), Duration::from_secs(5))
                .unwrap();
        let mut client = SyncClient::new(Arc::clone(&store), connection);
        client.connect().await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.revision() == 0 {
            assert!(tokio::time::Instant::now() < deadline, "no snapshot received");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        client.disconnect().await;
    }

    // Next launch, before any connection exists.
    let restored = TaskStore::open(FileStorage::new(&dir));
    assert_eq!(restored.tasks(), vec![Task::new("t1", "Buy milk")]);
    let _ = std::fs::remove_dir_all(&dir);
}
