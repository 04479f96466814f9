//! Authoritative task list.
//!
//! The [`TaskBoard`] is the only place task ids are minted. Every mutation
//! returns the affected task together with a copy of the complete list so the
//! caller can push a full snapshot back to the client.
//!
//! A board opened with [`TaskBoard::open`] writes the whole list to
//! `<dir>/tasks.snapshot` after every successful mutation, while still holding
//! the write lock, so the file always matches the latest list.

use std::path::{Path, PathBuf};

use tasksync_proto::{Task, TaskId};
use tokio::sync::RwLock;
use uuid::Uuid;

/// File name of the persisted list inside the data directory.
pub const SNAPSHOT_FILE: &str = "tasks.snapshot";

/// Errors returned by board mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// Task text was empty or whitespace only.
    #[error("task text cannot be empty")]
    EmptyText,
    /// No task with the given id exists.
    #[error("task with id '{0}' not found")]
    NotFound(TaskId),
}

/// Errors raised while restoring a persisted board.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The snapshot file or its directory could not be accessed.
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The snapshot file does not hold a task list.
    #[error("corrupt snapshot {path}: {reason}")]
    Corrupt {
        /// Path of the bad file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },
}

/// Ordered task list guarded by a [`RwLock`]. Insertion order is display order.
#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: RwLock<Vec<Task>>,
    snapshot: Option<PathBuf>,
}

impl TaskBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a board pre-populated with `tasks`.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
            snapshot: None,
        }
    }

    /// Opens a persistent board in `dir`, restoring the saved list if any.
    ///
    /// The directory is created if needed. A missing snapshot starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the directory or file cannot be read, or
    /// the file is not a valid snapshot. A corrupt file is never overwritten.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| SnapshotError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(SNAPSHOT_FILE);
        let tasks: Vec<Task> = match std::fs::read(&path) {
            Ok(bytes) => postcard::from_bytes(&bytes).map_err(|e| SnapshotError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };
        tracing::info!(path = %path.display(), count = tasks.len(), "task board opened");

        Ok(Self {
            tasks: RwLock::new(tasks),
            snapshot: Some(path),
        })
    }

    /// Path of the snapshot file, if this board is persistent.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Returns a copy of the full list.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.tasks.read().await.clone()
    }

    /// Appends a new open task with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::EmptyText`] if `text` is blank.
    pub async fn add(&self, text: &str) -> Result<(Task, Vec<Task>), BoardError> {
        if text.trim().is_empty() {
            return Err(BoardError::EmptyText);
        }
        let task = Task::new(Uuid::now_v7().to_string(), text);
        let mut tasks = self.tasks.write().await;
        tasks.push(task.clone());
        self.persist(&tasks).await;
        Ok((task, tasks.clone()))
    }

    /// Flips the `completed` flag of the task with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if no task has that id.
    pub async fn toggle(&self, id: &TaskId) -> Result<(Task, Vec<Task>), BoardError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))?;
        task.completed = !task.completed;
        let toggled = task.clone();
        self.persist(&tasks).await;
        Ok((toggled, tasks.clone()))
    }

    /// Writes `tasks` to the snapshot file. Callers hold the write lock.
    ///
    /// Failures are logged; the in-memory list stays authoritative.
    async fn persist(&self, tasks: &[Task]) {
        let Some(path) = self.snapshot.clone() else {
            return;
        };
        let bytes = match postcard::to_allocvec(tasks) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode task snapshot");
                return;
            }
        };

        let written = tokio::task::spawn_blocking(move || {
            let tmp = path.with_extension("snapshot.tmp");
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(&tmp, &path)
        })
        .await;
        match written {
            Ok(Ok(())) => tracing::debug!(count = tasks.len(), "task snapshot saved"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to save task snapshot"),
            Err(e) => tracing::warn!(error = %e, "snapshot writer panicked"),
        }
    }
}
