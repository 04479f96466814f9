//! Status bar rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::theme;
use crate::app::App;
use crate::connection::ConnectionState;

const HELP: &str = "Enter: add | Space: toggle | F5: refresh | Ctrl+O: reconnect | Esc: quit";

/// Render the status bar at the bottom of the screen.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let (dot_color, status_text) = match app.connection {
        ConnectionState::Connected => (theme::SUCCESS, "Connected"),
        ConnectionState::Connecting => (theme::WARNING, "Connecting..."),
        ConnectionState::Disconnected => (theme::OFFLINE, "Not connected"),
    };

    let count = match app.tasks.len() {
        1 => "1 task".to_string(),
        n => format!("{n} tasks"),
    };

    let mut spans = vec![
        Span::styled("tasksync", theme::bold()),
        Span::raw(" | "),
        Span::styled("●", theme::normal().fg(dot_color)),
        Span::raw(format!(" {status_text}")),
        Span::raw(" | "),
        Span::raw(count),
    ];
    if let Some(at) = &app.last_sync {
        spans.push(Span::raw(format!(" | synced {at}")));
    }
    spans.push(Span::raw(" | "));
    match &app.status_message {
        Some(message) => spans.push(Span::styled(message.as_str(), theme::bold())),
        None => spans.push(Span::styled(HELP, theme::dimmed())),
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::status_bar_bg());
    frame.render_widget(paragraph, area);
}
