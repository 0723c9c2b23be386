use ratatui::style::Style;
use ratatui::widgets::Block;
use ratatui::widgets::BorderType;
use ratatui::widgets::Borders;
use ratatui::widgets::Padding;

/// The prompt input box. The title names the session being written to, so
/// the block is swapped whenever the current session changes.
pub struct TextArea {}

impl<'a> TextArea {
    pub fn for_session(session_name: &str) -> tui_textarea::TextArea<'a> {
        let mut textarea = tui_textarea::TextArea::default();
        textarea.set_cursor_line_style(Style::default());
        textarea.set_block(TextArea::block(session_name));

        return textarea;
    }

    pub fn block(session_name: &str) -> Block<'a> {
        return Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Double)
            .title(format!(
                "Message {session_name} (Enter to send, /help for commands)"
            ))
            .padding(Padding::new(1, 1, 0, 0));
    }
}
