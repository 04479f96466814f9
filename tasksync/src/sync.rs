//! Sync protocol handler: intents out, snapshots in.
//!
//! [`SyncHandler`] sits on the inbound side. It decodes each frame and, for
//! any list-carrying event, replaces the store wholesale. [`SyncClient`] sits
//! on the outbound side. It turns one user intent into exactly one action and
//! hands it to the connection manager. Neither side ever edits the list
//! locally; the store only changes when the backend says so.

use std::sync::Arc;

use tasksync_proto::codec;
use tasksync_proto::{Action, ProtocolError, TaskId};

use crate::connection::{ConnectionError, ConnectionManager, ConnectionState, FrameHandler};
use crate::store::TaskStore;

/// Why an intent produced no outbound frame.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    /// The intent was invalid before reaching the wire.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The connection refused the action.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Applies inbound frames to a [`TaskStore`].
#[derive(Debug)]
pub struct SyncHandler {
    store: Arc<TaskStore>,
}

impl SyncHandler {
    /// Creates a handler writing into `store`.
    #[must_use]
    pub const fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

impl FrameHandler for SyncHandler {
    fn handle_frame(&self, frame: &str) {
        let event = match codec::decode_event(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(err = %e, len = frame.len(), "dropping malformed frame");
                return;
            }
        };

        let kind = event.kind();
        match event.into_snapshot() {
            Some(tasks) => {
                tracing::debug!(kind, count = tasks.len(), "applying snapshot");
                self.store.replace_tasks(tasks);
            }
            None => tracing::debug!(kind, "event carries no list"),
        }
    }
}

/// Intent layer over the connection: the only way the view talks to the
/// backend.
pub struct SyncClient {
    store: Arc<TaskStore>,
    connection: ConnectionManager,
}

impl SyncClient {
    /// Wires `store` and `connection` together. Does not connect.
    #[must_use]
    pub const fn new(store: Arc<TaskStore>, connection: ConnectionManager) -> Self {
        Self { store, connection }
    }

    /// The store snapshots are applied to.
    #[must_use]
    pub const fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// The underlying connection manager.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Opens the connection, routing inbound frames into the store.
    ///
    /// # Errors
    ///
    /// Propagates [`ConnectionError`] from [`ConnectionManager::connect`].
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        let handler = Arc::new(SyncHandler::new(Arc::clone(&self.store)));
        self.connection.connect(handler).await
    }

    /// Closes the connection.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
    }

    /// Asks the backend for the full list.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Connection`] when not connected.
    pub fn refresh(&self) -> Result<(), IntentError> {
        self.dispatch(&Action::GetTasks)
    }

    /// Asks the backend to append a task with `text`.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Protocol`] for blank text and
    /// [`IntentError::Connection`] when not connected. Either way no frame
    /// is sent.
    pub fn add_task(&self, text: &str) -> Result<(), IntentError> {
        let action = Action::add_task(text).inspect_err(|e| {
            tracing::warn!(err = %e, "add intent rejected");
        })?;
        self.dispatch(&action)
    }

    /// Asks the backend to flip the `completed` flag of task `id`.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Connection`] when not connected.
    pub fn toggle_task(&self, id: impl Into<TaskId>) -> Result<(), IntentError> {
        self.dispatch(&Action::toggle_task(id))
    }

    fn dispatch(&self, action: &Action) -> Result<(), IntentError> {
        self.connection.send(action)?;
        Ok(())
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("store", &self.store)
            .field("connection", &self.connection)
            .finish()
    }
}
