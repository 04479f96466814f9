//! Task model shared by the client and the backend.
//!
//! A [`Task`] is always created by the backend. The client only ever holds
//! tasks that arrived inside a server snapshot and never edits their fields.

use serde::{Deserialize, Serialize};

/// Opaque task identifier assigned by the backend.
///
/// Serialized as a bare JSON string. The client never generates one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an identifier string received from (or minted by) the backend.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Backend-assigned identifier, unique within a list.
    pub id: TaskId,
    /// Human-readable label.
    pub text: String,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    /// Creates an open task.
    pub fn new(id: impl Into<TaskId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            completed: false,
        }
    }

    /// Returns a copy of this task with the `completed` flag set.
    #[must_use]
    pub const fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}
