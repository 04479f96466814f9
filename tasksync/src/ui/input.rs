//! Input line rendering.

use ratatui::{
    Frame,
    layout::{Position, Rect},
    widgets::{Block, Borders, Paragraph},
};

use super::theme;
use crate::app::App;

/// Render the new-task input box and place the terminal cursor in it.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let input = Paragraph::new(app.input.as_str()).style(theme::normal()).block(
        Block::default()
            .title("New task")
            .borders(Borders::ALL)
            .border_style(theme::dimmed()),
    );
    frame.render_widget(input, area);

    let offset = u16::try_from(app.cursor_position).unwrap_or(u16::MAX);
    let x = area
        .x
        .saturating_add(1)
        .saturating_add(offset)
        .min(area.right().saturating_sub(2));
    frame.set_cursor_position(Position::new(x, area.y + 1));
}
