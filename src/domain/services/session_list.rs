#[cfg(test)]
#[path = "session_list_test.rs"]
mod tests;

use ratatui::prelude::Backend;
use ratatui::prelude::Rect;
use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::widgets::Block;
use ratatui::widgets::BorderType;
use ratatui::widgets::Borders;
use ratatui::widgets::List;
use ratatui::widgets::ListItem;
use ratatui::widgets::ListState;
use ratatui::Frame;

use crate::domain::models::Role;
use crate::domain::models::SessionEntry;

const PREVIEW_LENGTH: usize = 18;

/// Sidebar entries: the session number and name, followed by the first
/// thing the user asked in it.
pub fn session_labels(sessions: &[SessionEntry]) -> Vec<String> {
    return sessions
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let preview = entry
                .messages
                .iter()
                .find(|message| return message.role == Role::User)
                .map(|message| return message.preview(PREVIEW_LENGTH))
                .unwrap_or_else(|| return "(empty)".to_string());

            return format!("{}. {}\n   {preview}", idx + 1, entry.name);
        })
        .collect();
}

pub struct SessionList {}

impl SessionList {
    pub fn render<B: Backend>(
        frame: &mut Frame<B>,
        rect: Rect,
        sessions: &[SessionEntry],
        current: usize,
        locked: bool,
    ) {
        let items = session_labels(sessions)
            .into_iter()
            .map(|label| return ListItem::new(label))
            .collect::<Vec<ListItem>>();

        let mut title = "Sessions (Tab)";
        if locked {
            title = "Sessions (busy)";
        }

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .title(title),
            )
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        let mut state = ListState::default();
        state.select(Some(current));

        frame.render_stateful_widget(list, rect, &mut state);
    }
}
