//! `tasksync`: terminal task list synced with a backend over WebSocket.
//!
//! Restores the last persisted snapshot, connects on startup and shows the
//! list. Configuration via CLI flags, environment variables, or config file
//! (`~/.config/tasksync/config.toml`).
//!
//! ```bash
//! # Against a local tasksync-server
//! cargo run --bin tasksync
//!
//! # Against another backend
//! cargo run --bin tasksync -- --base-url https://node.example.com/todo/
//! TASKSYNC_BASE_URL=http://127.0.0.1:9000/ cargo run --bin tasksync
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing_appender::non_blocking::WorkerGuard;

use tasksync::app::App;
use tasksync::config::{CliArgs, ClientConfig};
use tasksync::connection::ConnectionManager;
use tasksync::store::{FileStorage, TaskStore};
use tasksync::sync::SyncClient;
use tasksync::ui;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Logs go to a file; the TUI owns stdout.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    tracing::info!(base_url = %config.base_url, "tasksync starting");

    let connection = match ConnectionManager::from_base(&config.base_url, config.connect_timeout) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let store = Arc::new(TaskStore::open(FileStorage::new(&config.data_dir)));
    let mut client = SyncClient::new(store, connection);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut client, &config).await;

    client.disconnect().await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("tasksync exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasksync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main application loop.
///
/// Connects once on entry. A failed connect leaves the client offline with
/// the restored snapshot on screen; Ctrl+O retries. The screen keeps
/// redrawing while a connect is in flight.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    client: &mut SyncClient,
    config: &ClientConfig,
) -> io::Result<()> {
    let mut app = App::new(config.timestamp_format.as_str());
    app.sync_from(client.store(), client.state());
    app.connect_interactive(client, config.poll_timeout, |app| {
        tick_while_connecting(terminal, app)
    })
    .await?;

    loop {
        if app.should_quit {
            return Ok(());
        }

        app.sync_from(client.store(), client.state());
        terminal.draw(|frame| ui::draw(frame, &app))?;

        if event::poll(config.poll_timeout)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if let Some(intent) = app.handle_key_event(key) {
                app.apply_intent(client, intent);
            }
        }

        if app.take_reconnect_request() {
            app.connect_interactive(client, config.poll_timeout, |app| {
                tick_while_connecting(terminal, app)
            })
            .await?;
        }
    }
}

/// One frame while connecting: draw, then drain pending key presses.
///
/// Intents cannot be sent yet, so they are deferred back to the app.
fn tick_while_connecting(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    terminal.draw(|frame| ui::draw(frame, app))?;

    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && let Some(intent) = app.handle_key_event(key)
        {
            app.defer_intent(intent);
        }
    }
    Ok(())
}
