//! Application state and event handling.
//!
//! [`App`] is the view model. It never edits tasks itself: it mirrors the
//! store, turns key presses into [`Intent`]s, and shows what happened to them.
//!
//! Connecting is the only slow operation. [`App::connect_interactive`] runs it
//! alongside a redraw/input tick so the screen shows `Connecting...` and Esc
//! still quits while the handshake is pending.

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tasksync_proto::{ProtocolError, Task, TaskId};

use crate::connection::{ConnectionError, ConnectionState};
use crate::store::TaskStore;
use crate::sync::{IntentError, SyncClient};

/// A user request produced by a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Add a task with this text.
    Add(String),
    /// Flip the completed flag of this task.
    Toggle(TaskId),
    /// Re-request the full list.
    Refresh,
    /// Open a new connection after the previous one dropped.
    Reconnect,
}

/// Main application state.
pub struct App {
    /// Current text input.
    pub input: String,
    /// Cursor position in input (character index).
    pub cursor_position: usize,
    /// Tasks as last read from the store.
    pub tasks: Vec<Task>,
    /// Index of the selected task.
    pub selected: usize,
    /// Connection state as of the last tick.
    pub connection: ConnectionState,
    /// Outcome of the latest intent, shown in the status bar.
    pub status_message: Option<String>,
    /// When the last snapshot arrived, already formatted.
    pub last_sync: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    timestamp_format: String,
    seen_revision: Option<u64>,
    reconnect_requested: bool,
}

impl App {
    /// Create an empty application state.
    #[must_use]
    pub fn new(timestamp_format: impl Into<String>) -> Self {
        Self {
            input: String::new(),
            cursor_position: 0,
            tasks: Vec::new(),
            selected: 0,
            connection: ConnectionState::Disconnected,
            status_message: None,
            last_sync: None,
            should_quit: false,
            timestamp_format: timestamp_format.into(),
            seen_revision: None,
            reconnect_requested: false,
        }
    }

    /// Pull the latest store contents and connection state.
    ///
    /// The task list is only re-read when the store revision changed.
    pub fn sync_from(&mut self, store: &TaskStore, connection: ConnectionState) {
        if connection != self.connection {
            tracing::debug!(from = %self.connection, to = %connection, "connection state changed");
            self.connection = connection;
        }

        let revision = store.revision();
        if self.seen_revision == Some(revision) {
            return;
        }
        if self.seen_revision.is_some() || revision > 0 {
            self.last_sync = self.timestamp_now();
        }
        self.seen_revision = Some(revision);
        self.tasks = store.tasks();
        self.selected = self.selected.min(self.tasks.len().saturating_sub(1));
    }

    /// Current local time in the configured format, or `None` if the format
    /// cannot be rendered.
    fn timestamp_now(&self) -> Option<String> {
        let mut stamp = String::new();
        let now = chrono::Local::now();
        match write!(stamp, "{}", now.format(&self.timestamp_format)) {
            Ok(()) => Some(stamp),
            Err(_) => {
                tracing::warn!(format = %self.timestamp_format, "cannot render timestamp");
                None
            }
        }
    }

    /// The task under the selection cursor, if any.
    #[must_use]
    pub fn selected_task(&self) -> Option<&Task> {
        self.tasks.get(self.selected)
    }

    /// Handle a key event, returning the intent it produced, if any.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<Intent> {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => {
                self.should_quit = true;
                return None;
            }
            (KeyCode::Char('r'), KeyModifiers::CONTROL) | (KeyCode::F(5), _) => {
                return Some(Intent::Refresh);
            }
            (KeyCode::Char('o'), KeyModifiers::CONTROL) => return Some(Intent::Reconnect),
            _ => {}
        }

        let navigating = self.input.is_empty();
        match key.code {
            KeyCode::Enter => return self.submit_input(),
            KeyCode::Up => self.select_prev(),
            KeyCode::Down => self.select_next(),
            KeyCode::Char('k') if navigating => self.select_prev(),
            KeyCode::Char('j') if navigating => self.select_next(),
            KeyCode::Char(' ') if navigating => {
                return self.selected_task().map(|t| Intent::Toggle(t.id.clone()));
            }
            KeyCode::Char(c) => self.enter_char(c),
            KeyCode::Backspace => self.delete_char(),
            KeyCode::Left => self.move_cursor_left(),
            KeyCode::Right => self.move_cursor_right(),
            KeyCode::Home => self.cursor_position = 0,
            KeyCode::End => self.cursor_position = self.input.chars().count(),
            _ => {}
        }
        None
    }

    /// Carry out `intent` through `client` and record the outcome.
    ///
    /// An add that never left the client puts its text back in the input.
    /// [`Intent::Reconnect`] only records the request; the caller picks it up
    /// with [`Self::take_reconnect_request`] and runs
    /// [`Self::connect_interactive`].
    pub fn apply_intent(&mut self, client: &SyncClient, intent: Intent) {
        match intent {
            Intent::Add(text) => {
                let result = client.add_task(&text);
                if result.is_err() {
                    self.restore_input(text);
                }
                self.report("add", result);
            }
            Intent::Toggle(id) => {
                let result = client.toggle_task(id);
                self.report("toggle", result);
            }
            Intent::Refresh => {
                let result = client.refresh();
                self.report("refresh", result);
            }
            Intent::Reconnect => {
                if client.state() == ConnectionState::Disconnected {
                    self.reconnect_requested = true;
                } else {
                    self.status_message = Some("Already connected".to_string());
                }
            }
        }
    }

    /// Whether a reconnect was requested since the last call. Clears the flag.
    pub const fn take_reconnect_request(&mut self) -> bool {
        std::mem::replace(&mut self.reconnect_requested, false)
    }

    /// Answer an intent that arrived while a connect is still in flight.
    ///
    /// Nothing is sent. An add keeps its text in the input.
    pub fn defer_intent(&mut self, intent: Intent) {
        let what = match intent {
            Intent::Add(text) => {
                self.restore_input(text);
                "add"
            }
            Intent::Toggle(_) => "toggle",
            Intent::Refresh => "refresh",
            Intent::Reconnect => {
                self.status_message = Some("Already connecting".to_string());
                return;
            }
        };
        self.status_message = Some(format!("Still connecting: {what} not sent"));
    }

    /// Connect `client`, calling `tick` every `tick_every` until it settles.
    ///
    /// Before each tick the app is re-synced from the store and connection,
    /// so `tick` can draw the current `Connecting` state and read input.
    /// If `tick` sets [`Self::should_quit`] the attempt is abandoned and the
    /// connection drops back to `Disconnected`.
    ///
    /// # Errors
    ///
    /// Returns the first error `tick` returns; the attempt is abandoned.
    /// Connect failures are not errors here, they go to the status bar.
    pub async fn connect_interactive<F>(
        &mut self,
        client: &mut SyncClient,
        tick_every: Duration,
        mut tick: F,
    ) -> io::Result<()>
    where
        F: FnMut(&mut Self) -> io::Result<()> + Send,
    {
        let store = Arc::clone(client.store());
        let states = client.connection().subscribe();
        self.status_message = Some("Connecting...".to_string());

        let mut ticker = tokio::time::interval(tick_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let connect = client.connect();
        tokio::pin!(connect);

        let outcome = loop {
            tokio::select! {
                // Connect is polled first so the first tick already sees
                // Connecting.
                biased;
                result = &mut connect => break Some(result),
                _ = ticker.tick() => {
                    let state = *states.borrow();
                    self.sync_from(&store, state);
                    tick(self)?;
                    if self.should_quit {
                        break None;
                    }
                }
            }
        };

        self.status_message = Some(match outcome {
            Some(Ok(())) => "Connected".to_string(),
            Some(Err(e)) => {
                tracing::warn!(err = %e, "connect failed");
                format!("Connect failed: {e}")
            }
            None => {
                tracing::info!("connect abandoned on quit");
                "Connect cancelled".to_string()
            }
        });
        Ok(())
    }

    fn report(&mut self, what: &str, result: Result<(), IntentError>) {
        self.status_message = Some(match result {
            Ok(()) => format!("Sent {what}"),
            Err(IntentError::Connection(ConnectionError::NotConnected)) => {
                format!("Not connected: {what} not sent")
            }
            Err(IntentError::Protocol(ProtocolError::EmptyText)) => {
                "Task text cannot be empty".to_string()
            }
            Err(e) => format!("{what} failed: {e}"),
        });
    }

    fn submit_input(&mut self) -> Option<Intent> {
        if self.input.trim().is_empty() {
            self.status_message = Some("Task text cannot be empty".to_string());
            return None;
        }
        self.cursor_position = 0;
        Some(Intent::Add(std::mem::take(&mut self.input)))
    }

    fn restore_input(&mut self, text: String) {
        self.cursor_position = text.chars().count();
        self.input = text;
    }

    /// Byte offset of the cursor in `input`.
    fn cursor_byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn enter_char(&mut self, c: char) {
        let index = self.cursor_byte_index();
        self.input.insert(index, c);
        self.cursor_position += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let index = self.cursor_byte_index();
            self.input.remove(index);
        }
    }

    const fn move_cursor_left(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
        }
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }

    const fn select_prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    const fn select_next(&mut self) {
        if self.selected < self.tasks.len().saturating_sub(1) {
            self.selected += 1;
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new("%H:%M:%S")
    }
}
