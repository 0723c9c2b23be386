#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoticeType {
    Normal,
    Error,
}

/// A one line status shown under the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    ntype: NoticeType,
}

impl Notice {
    pub fn new(text: &str) -> Notice {
        return Notice {
            text: text.to_string(),
            ntype: NoticeType::Normal,
        };
    }

    pub fn error(text: &str) -> Notice {
        return Notice {
            text: text.to_string(),
            ntype: NoticeType::Error,
        };
    }

    pub fn notice_type(&self) -> NoticeType {
        return self.ntype;
    }
}
