//! Terminal UI rendering.
//!
//! Rendering is a pure function of [`App`]; nothing here mutates state.

pub mod input;
pub mod status_bar;
pub mod task_panel;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
};

use crate::app::App;

/// Main draw function for the entire UI.
pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    task_panel::render(frame, chunks[0], app);
    input::render(frame, chunks[1], app);
    status_bar::render(frame, chunks[2], app);
}
