#[cfg(test)]
#[path = "bubble_test.rs"]
mod tests;

use ratatui::style::Color;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;

use crate::domain::models::Message;
use crate::domain::models::Role;

#[derive(PartialEq, Eq)]
pub enum BubbleAlignment {
    Left,
    Right,
}

pub struct BubbleConfig {
    pub border_elements_length: usize,
    pub outer_padding_percentage: f32,
}

/// A single message drawn as a bordered box with the author in the top
/// border. User messages hang right, replies hang left.
pub struct Bubble<'a> {
    alignment: BubbleAlignment,
    message: &'a Message,
    label: &'a str,
    window_max_width: usize,
    in_progress: bool,
}

impl<'a> Bubble<'a> {
    pub fn new(message: &'a Message, label: &'a str, window_max_width: usize) -> Bubble<'a> {
        let mut alignment = BubbleAlignment::Left;
        if message.role == Role::User {
            alignment = BubbleAlignment::Right;
        }

        return Bubble {
            alignment,
            message,
            label,
            window_max_width,
            in_progress: false,
        };
    }

    /// Marks the bubble as a reply still being streamed.
    pub fn in_progress(mut self) -> Bubble<'a> {
        self.in_progress = true;
        return self;
    }

    pub fn style_config() -> BubbleConfig {
        return BubbleConfig {
            // left border + left padding + (text, not counted) + right padding + right border.
            border_elements_length: 4,
            outer_padding_percentage: 0.04,
        };
    }

    fn max_text_width(&self) -> usize {
        let style_config = Bubble::style_config();
        let min_outer_padding =
            (self.window_max_width as f32 * style_config.outer_padding_percentage).ceil() as usize;

        return self
            .window_max_width
            .saturating_sub(style_config.border_elements_length + min_outer_padding)
            .max(1);
    }

    pub fn as_lines(&self) -> Vec<Line<'static>> {
        let max_text_width = self.max_text_width();

        let mut content = self.message.content.to_string();
        if self.in_progress {
            content += "▌";
        }
        let text_lines = Message::new(self.message.role, &content).as_string_lines(max_text_width);

        let label = self
            .label
            .chars()
            .take(max_text_width + 2)
            .collect::<String>();
        let label_len = label.chars().count();

        let inner_width = text_lines
            .iter()
            .map(|line| return line.chars().count())
            .max()
            .unwrap_or(0)
            .max(label_len.saturating_sub(2));

        let outer_padding = " ".repeat(
            self.window_max_width
                .saturating_sub(inner_width + Bubble::style_config().border_elements_length),
        );

        let top_bar = format!(
            "╭{label}{}╮",
            "─".repeat(inner_width + 2 - label_len)
        );
        let bottom_bar = format!("╰{}╯", "─".repeat(inner_width + 2));

        let mut lines = vec![self.border_line(top_bar, &outer_padding)];
        for text in text_lines {
            let fill = " ".repeat(inner_width - text.chars().count());
            lines.push(self.text_line(text, fill, &outer_padding));
        }
        lines.push(self.border_line(bottom_bar, &outer_padding));

        return lines;
    }

    fn border_style(&self) -> Style {
        if self.alignment == BubbleAlignment::Right {
            return Style {
                fg: Some(Color::Cyan),
                ..Style::default()
            };
        }

        return Style::default();
    }

    fn aligned(&self, mut spans: Vec<Span<'static>>, outer_padding: &str) -> Line<'static> {
        if self.alignment == BubbleAlignment::Right && !outer_padding.is_empty() {
            spans.insert(0, Span::from(outer_padding.to_string()));
        }

        return Line::from(spans);
    }

    fn border_line(&self, bar: String, outer_padding: &str) -> Line<'static> {
        return self.aligned(vec![Span::styled(bar, self.border_style())], outer_padding);
    }

    fn text_line(&self, text: String, fill: String, outer_padding: &str) -> Line<'static> {
        return self.aligned(
            vec![
                Span::styled("│ ", self.border_style()),
                Span::from(text),
                Span::styled(format!("{fill} │"), self.border_style()),
            ],
            outer_padding,
        );
    }
}
