//! Inbound event messages (backend → client).
//!
//! Every list-carrying event holds the backend's complete current list under
//! `tasks`. The `type` discriminator only says which action caused the
//! snapshot; consumers are expected to treat all three the same way and
//! replace their local list wholesale (see [`ServerEvent::into_snapshot`]).

use serde::{Deserialize, Serialize};

use crate::task::Task;

/// A message pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to `get_tasks`.
    TasksOverview {
        /// Full current list.
        tasks: Vec<Task>,
    },
    /// Reply to `add_task`.
    TaskAdded {
        /// The task that was created, when the backend includes it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
        /// Full current list.
        tasks: Vec<Task>,
    },
    /// Reply to `toggle_task`.
    TaskToggled {
        /// The task that was flipped, when the backend includes it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
        /// Full current list.
        tasks: Vec<Task>,
    },
    /// Keepalive acknowledgment. Carries no list.
    Ack,
}

impl ServerEvent {
    /// Wire tag of this event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TasksOverview { .. } => "tasks_overview",
            Self::TaskAdded { .. } => "task_added",
            Self::TaskToggled { .. } => "task_toggled",
            Self::Ack => "ack",
        }
    }

    /// Returns the full list carried by this event, if any.
    ///
    /// The three list-carrying variants share one arm on purpose: the
    /// discriminator never changes how the list is applied.
    #[must_use]
    pub fn into_snapshot(self) -> Option<Vec<Task>> {
        match self {
            Self::TasksOverview { tasks }
            | Self::TaskAdded { tasks, .. }
            | Self::TaskToggled { tasks, .. } => Some(tasks),
            Self::Ack => None,
        }
    }
}
