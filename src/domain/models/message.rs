#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Role;

/// One role tagged utterance within a session. Content is kept exactly as
/// typed or streamed so the cached transcript always matches what the store
/// holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Message {
        return Message {
            role,
            content: content.to_string(),
        };
    }

    pub fn append(&mut self, text: &str) {
        self.content += text;
    }

    /// Word wraps the content to the given width, splitting words that are
    /// wider than a whole line.
    pub fn as_string_lines(&self, line_max_width: usize) -> Vec<String> {
        let width = line_max_width.max(1);
        let mut lines: Vec<String> = vec![];

        for full_line in self.content.replace('\t', "  ").split('\n') {
            if full_line.trim().is_empty() {
                lines.push("".to_string());
                continue;
            }

            let mut current = String::new();
            let mut current_len = 0;

            for word in full_line.split(' ') {
                let word_len = word.chars().count();
                if current_len > 0 && current_len + 1 + word_len > width {
                    lines.push(current.trim_end().to_string());
                    current = String::new();
                    current_len = 0;
                }

                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }

                for char in word.chars() {
                    if current_len == width {
                        lines.push(current.trim_end().to_string());
                        current = String::new();
                        current_len = 0;
                    }
                    current.push(char);
                    current_len += 1;
                }
            }

            lines.push(current.trim_end().to_string());
        }

        return lines;
    }

    /// First non-empty line, shortened for list displays.
    pub fn preview(&self, max_len: usize) -> String {
        let line = self
            .content
            .lines()
            .find(|line| return !line.trim().is_empty())
            .unwrap_or("")
            .trim();

        if line.chars().count() <= max_len {
            return line.to_string();
        }

        let cut = line
            .chars()
            .take(max_len.saturating_sub(3))
            .collect::<String>();
        return format!("{cut}...");
    }
}
