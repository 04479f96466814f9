//! `tasksync`: a terminal task list kept in sync with a single backend.
//!
//! The crate is layered leaves-first: [`store`] holds the canonical list,
//! [`connection`] owns the WebSocket link, [`sync`] translates between the
//! two, and [`app`] / [`ui`] form the view.

pub mod app;
pub mod config;
pub mod connection;
pub mod store;
pub mod sync;
pub mod ui;
