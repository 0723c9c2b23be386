use std::collections::HashMap;

use ratatui::prelude::Backend;
use ratatui::prelude::Rect;
use ratatui::text::Line;
use ratatui::widgets::Block;
use ratatui::widgets::Borders;
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use super::Bubble;
use crate::domain::models::Message;
use crate::domain::models::Role;

#[cfg(test)]
#[path = "bubble_list_test.rs"]
mod tests;

struct BubbleCacheEntry {
    text_len: usize,
    lines: Vec<Line<'static>>,
}

/// The transcript of the current session as rendered lines. Finished
/// messages are cached per index; the cache is dropped whenever the session
/// or the width changes.
pub struct BubbleList {
    cache: HashMap<usize, BubbleCacheEntry>,
    pending: Vec<Line<'static>>,
    session_id: String,
    line_width: usize,
    lines_len: usize,
    username: String,
    model: String,
}

impl BubbleList {
    pub fn new(username: &str, model: &str) -> BubbleList {
        return BubbleList {
            cache: HashMap::new(),
            pending: vec![],
            session_id: "".to_string(),
            line_width: 0,
            lines_len: 0,
            username: username.to_string(),
            model: model.to_string(),
        };
    }

    fn label(&self, role: Role) -> &str {
        if role == Role::User {
            return &self.username;
        }

        return &self.model;
    }

    pub fn set_messages(
        &mut self,
        session_id: &str,
        messages: &[Message],
        pending_reply: Option<&str>,
        line_width: usize,
    ) {
        if self.line_width != line_width || self.session_id != session_id {
            self.cache.clear();
            self.line_width = line_width;
            self.session_id = session_id.to_string();
        }
        self.cache.retain(|idx, _| return *idx < messages.len());

        for (idx, message) in messages.iter().enumerate() {
            if let Some(cache_entry) = self.cache.get(&idx) {
                if cache_entry.text_len == message.content.len() {
                    continue;
                }
            }

            let lines = Bubble::new(message, self.label(message.role), line_width).as_lines();
            self.cache.insert(
                idx,
                BubbleCacheEntry {
                    text_len: message.content.len(),
                    lines,
                },
            );
        }

        self.pending = vec![];
        if let Some(reply) = pending_reply {
            let message = Message::new(Role::Assistant, reply);
            self.pending = Bubble::new(&message, &self.model, line_width)
                .in_progress()
                .as_lines();
        }

        self.lines_len = self
            .cache
            .values()
            .map(|entry| return entry.lines.len())
            .sum::<usize>()
            + self.pending.len();
    }

    pub fn len(&self) -> usize {
        return self.lines_len;
    }

    pub fn is_empty(&self) -> bool {
        return self.lines_len == 0;
    }

    pub fn lines(&self) -> Vec<Line<'static>> {
        let mut indexes: Vec<usize> = self.cache.keys().cloned().collect();
        indexes.sort();

        let mut lines: Vec<Line<'static>> = indexes
            .iter()
            .filter_map(|idx| return self.cache.get(idx))
            .flat_map(|entry| return entry.lines.to_owned())
            .collect();
        lines.extend(self.pending.to_owned());

        return lines;
    }

    pub fn render<B: Backend>(&self, frame: &mut Frame<B>, rect: Rect, scroll: u16) {
        let mut lines = self.lines();
        if lines.is_empty() {
            lines = vec![Line::from("No messages yet. Say hello!")];
        }

        frame.render_widget(
            Paragraph::new(lines)
                .block(Block::default().borders(Borders::NONE))
                .scroll((scroll, 0)),
            rect,
        );
    }
}
