#[cfg(test)]
#[path = "scroll_test.rs"]
mod tests;

const PAGE_SIZE: u16 = 10;

/// Vertical scroll position of the transcript. `follow` keeps the view
/// pinned to the bottom while new lines stream in, until the user scrolls up.
pub struct Scroll {
    list_length: u16,
    viewport_length: u16,
    pub position: u16,
    follow: bool,
}

impl Default for Scroll {
    fn default() -> Scroll {
        return Scroll {
            list_length: 0,
            viewport_length: 0,
            position: 0,
            follow: true,
        };
    }
}

impl Scroll {
    fn max_position(&self) -> u16 {
        return self.list_length.saturating_sub(self.viewport_length);
    }

    pub fn up(&mut self) {
        self.position = self.position.saturating_sub(1);
        self.follow = false;
    }

    pub fn up_page(&mut self) {
        for _ in 0..PAGE_SIZE {
            self.up();
        }
    }

    pub fn down(&mut self) {
        self.position = self.position.saturating_add(1).min(self.max_position());
        self.follow = self.position == self.max_position();
    }

    pub fn down_page(&mut self) {
        for _ in 0..PAGE_SIZE {
            self.down();
        }
    }

    pub fn last(&mut self) {
        self.position = self.max_position();
        self.follow = true;
    }

    pub fn set_state(&mut self, list_length: u16, viewport_length: u16) {
        self.list_length = list_length;
        self.viewport_length = viewport_length;

        if self.follow {
            self.position = self.max_position();
        } else {
            self.position = self.position.min(self.max_position());
        }
    }
}
