//! Outbound action messages (client → backend).
//!
//! Each user intent maps to exactly one [`Action`]. The `action` tag strings
//! and field names are the compatibility contract with the backend:
//!
//! ```json
//! { "action": "get_tasks" }
//! { "action": "add_task", "text": "Buy milk" }
//! { "action": "toggle_task", "id": "t1" }
//! ```

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Errors raised while building an action from user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Task text was empty or whitespace only.
    #[error("task text cannot be empty")]
    EmptyText,
}

/// A request for the backend to perform one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Ask for the full current list.
    GetTasks,
    /// Append a new task with the given text.
    AddTask {
        /// Task label, never blank.
        text: String,
    },
    /// Flip the `completed` flag of the task with this id.
    ToggleTask {
        /// Target task.
        id: TaskId,
    },
}

impl Action {
    /// Builds an `add_task` action.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EmptyText`] if `text` is empty after trimming.
    /// The text itself is sent untrimmed.
    pub fn add_task(text: impl Into<String>) -> Result<Self, ProtocolError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ProtocolError::EmptyText);
        }
        Ok(Self::AddTask { text })
    }

    /// Builds a `toggle_task` action.
    pub fn toggle_task(id: impl Into<TaskId>) -> Self {
        Self::ToggleTask { id: id.into() }
    }

    /// Wire tag of this action.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetTasks => "get_tasks",
            Self::AddTask { .. } => "add_task",
            Self::ToggleTask { .. } => "toggle_task",
        }
    }
}
