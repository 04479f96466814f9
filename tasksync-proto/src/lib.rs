//! Shared protocol definitions for the tasksync wire format.

pub mod action;
pub mod codec;
pub mod event;
pub mod task;

pub use action::{Action, ProtocolError};
pub use event::ServerEvent;
pub use task::{Task, TaskId};
