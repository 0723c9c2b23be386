use ratatui::prelude::Alignment;
use ratatui::prelude::Backend;
use ratatui::prelude::Rect;
use ratatui::widgets::Block;
use ratatui::widgets::BorderType;
use ratatui::widgets::Borders;
use ratatui::widgets::Padding;
use ratatui::widgets::Paragraph;
use ratatui::Frame;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Default)]
pub struct Loading {
    tick: usize,
}

impl Loading {
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    pub fn render<B: Backend>(&self, frame: &mut Frame<B>, rect: Rect, model: &str) {
        let spinner = SPINNER[self.tick % SPINNER.len()];
        frame.render_widget(
            Paragraph::new(format!("{spinner} Waiting for {model} to finish replying..."))
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Double)
                        .padding(Padding::new(1, 1, 0, 0)),
                )
                .alignment(Alignment::Center),
            rect,
        );
    }
}
