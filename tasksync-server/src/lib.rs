//! tasksync reference backend.
//!
//! Holds the authoritative task list and answers every action with a full
//! snapshot. Exposed as a library so tests can run it in-process.

pub mod board;
pub mod config;
pub mod server;
