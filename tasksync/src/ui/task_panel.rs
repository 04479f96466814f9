//! Task panel rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use super::theme;
use crate::app::App;

/// Render the task list in store order, or a placeholder when empty.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(Span::styled("Tasks", theme::panel_title(theme::TASKS_TITLE)))
        .borders(Borders::ALL)
        .border_style(theme::normal());

    if app.tasks.is_empty() {
        let placeholder =
            Paragraph::new(Line::styled("No tasks yet.", theme::dimmed())).block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let items: Vec<ListItem> = app
        .tasks
        .iter()
        .map(|task| {
            let (checkbox, style) = if task.completed {
                ("[x]", theme::completed())
            } else {
                ("[ ]", theme::normal())
            };
            ListItem::new(Line::from(vec![
                Span::styled(checkbox, style),
                Span::raw(" "),
                Span::styled(task.text.as_str(), style),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(theme::selected());
    let mut state = ListState::default().with_selected(Some(app.selected));

    frame.render_stateful_widget(list, area, &mut state);
}
