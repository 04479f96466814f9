//! tasksync backend server.
//!
//! An axum WebSocket server holding the authoritative task list. The list is
//! saved to `<data-dir>/tasks.snapshot` after every change and restored on
//! startup.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:8080
//! cargo run --bin tasksync-server
//!
//! # Run on custom address
//! cargo run --bin tasksync-server -- --bind 0.0.0.0:9000
//!
//! # Or via environment variable
//! TASKSYNC_SERVER_ADDR=0.0.0.0:9000 cargo run --bin tasksync-server
//!
//! # Keep the board somewhere specific
//! cargo run --bin tasksync-server -- --data-dir /var/lib/tasksync
//! ```

use std::sync::Arc;

use clap::Parser;
use tasksync_server::board::TaskBoard;
use tasksync_server::config::{ServerCliArgs, ServerConfig};
use tasksync_server::server::{self, ServerState};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting tasksync server");

    let board = match TaskBoard::open(&config.data_dir) {
        Ok(board) => board,
        Err(e) => {
            tracing::error!(error = %e, "failed to open task board");
            std::process::exit(1);
        }
    };
    let state = Arc::new(ServerState::with_board(board));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
