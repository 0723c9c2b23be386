use chrono::DateTime;
use chrono::Utc;

use super::Message;

/// A session row as listed from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
    pub first_user_message: Option<String>,
}

/// A session held in the orchestrator's working set. The name is derived
/// for display and never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEntry {
    pub id: String,
    pub name: String,
    pub messages: Vec<Message>,
}

impl SessionEntry {
    pub fn new(id: &str, name: &str, messages: Vec<Message>) -> SessionEntry {
        return SessionEntry {
            id: id.to_string(),
            name: name.to_string(),
            messages,
        };
    }
}
