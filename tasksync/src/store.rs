//! Client-side task store with durable snapshot persistence.
//!
//! The [`TaskStore`] holds the canonical local task list. Its only mutation
//! is [`TaskStore::replace_tasks`], which swaps the whole list and writes it
//! to a [`SnapshotStorage`] under the fixed key [`SNAPSHOT_KEY`] so the next
//! start restores the last known snapshot before any connection exists.
//!
//! Storage failures never surface to callers: they are logged and the
//! in-memory list stays authoritative for the session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tasksync_proto::Task;

/// Storage key the task list is persisted under.
pub const SNAPSHOT_KEY: &str = "tasks";

/// Errors raised by a [`SnapshotStorage`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The task list could not be serialized.
    #[error("snapshot encode error: {0}")]
    Encode(String),
    /// The stored bytes are not a valid snapshot.
    #[error("snapshot decode error: {0}")]
    Decode(String),
}

/// Durable key/value storage for serialized snapshots.
pub trait SnapshotStorage: Send + Sync {
    /// Reads the entry stored under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the entry exists but cannot be read.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes `bytes` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the entry cannot be written.
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

impl<S: SnapshotStorage + ?Sized> SnapshotStorage for Arc<S> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).save(key, bytes)
    }
}

/// One file per key inside a data directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Creates a file storage rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshot files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.snapshot"))
    }
}

impl SnapshotStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("snapshot.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process storage, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Creates an empty memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tasks: Vec<Task>,
    revision: u64,
}

/// The canonical client-side task list.
///
/// Shared as `Arc<TaskStore>` between the connection reader (the only writer,
/// via the sync handler) and the view (reader).
pub struct TaskStore {
    inner: RwLock<StoreInner>,
    storage: Box<dyn SnapshotStorage>,
    /// Revision last written to `storage`. Held for the whole save.
    persisted: Mutex<u64>,
}

impl TaskStore {
    /// Opens a store over `storage`, restoring the persisted snapshot if any.
    ///
    /// A missing entry starts empty. An unreadable or corrupt entry is logged
    /// and also starts empty.
    pub fn open(storage: impl SnapshotStorage + 'static) -> Self {
        let tasks = match restore(&storage) {
            Ok(Some(tasks)) => {
                tracing::info!(count = tasks.len(), "restored task snapshot");
                tasks
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable task snapshot");
                Vec::new()
            }
        };

        Self {
            inner: RwLock::new(StoreInner { tasks, revision: 0 }),
            storage: Box::new(storage),
            persisted: Mutex::new(0),
        }
    }

    /// Creates an empty store backed by [`MemoryStorage`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::open(MemoryStorage::new())
    }

    /// Replaces the whole list with `tasks` and persists it.
    ///
    /// No merging: afterwards [`Self::tasks`] returns exactly `tasks`.
    /// Persistence failures are logged and otherwise ignored. Concurrent
    /// calls never leave an older list on disk than the one in memory.
    pub fn replace_tasks(&self, tasks: Vec<Task>) {
        let encoded = postcard::to_allocvec(&tasks);
        let revision = {
            let mut inner = self.inner.write();
            inner.tasks = tasks;
            inner.revision += 1;
            inner.revision
        };

        let mut persisted = self.persisted.lock();
        if *persisted > revision {
            tracing::debug!(revision, newer = *persisted, "skipping stale snapshot save");
            return;
        }
        let result = encoded
            .map_err(|e| StorageError::Encode(e.to_string()))
            .and_then(|bytes| self.storage.save(SNAPSHOT_KEY, &bytes));
        match result {
            Ok(()) => *persisted = revision,
            Err(e) => tracing::warn!(error = %e, "failed to persist task snapshot"),
        }
    }

    /// Returns a copy of the current list.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.read().tasks.clone()
    }

    /// Returns the task at `index`, if any.
    #[must_use]
    pub fn task(&self, index: usize) -> Option<Task> {
        self.inner.read().tasks.get(index).cloned()
    }

    /// Number of tasks in the current list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    /// Whether the current list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().tasks.is_empty()
    }

    /// Counter bumped on every [`Self::replace_tasks`]; starts at 0.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TaskStore")
            .field("tasks", &inner.tasks.len())
            .field("revision", &inner.revision)
            .finish_non_exhaustive()
    }
}

fn restore(storage: &dyn SnapshotStorage) -> Result<Option<Vec<Task>>, StorageError> {
    let Some(bytes) = storage.load(SNAPSHOT_KEY)? else {
        return Ok(None);
    };
    postcard::from_bytes(&bytes)
        .map(Some)
        .map_err(|e| StorageError::Decode(e.to_string()))
}
