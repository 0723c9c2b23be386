#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;

use futures::stream::StreamExt;

use crate::domain::models::BackendBox;
use crate::domain::models::CompletionError;
use crate::domain::models::Message;
use crate::domain::models::ReplyStream;
use crate::domain::models::Role;
use crate::domain::models::SessionEntry;
use crate::domain::models::TurnError;
use crate::infrastructure::store::SessionStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingReply,
}

struct PendingTurn {
    session_id: String,
    user_message_id: i64,
    reply: String,
}

/// Owns the sessions open in this process and the single turn in flight.
/// The store stays the system of record; every entry here is a cache that
/// is filled at load and appended to on each turn.
pub struct Orchestrator {
    store: SessionStore,
    backend: BackendBox,
    sessions: Vec<SessionEntry>,
    current: usize,
    session_counter: usize,
    max_context_messages: usize,
    pending: Option<PendingTurn>,
}

impl Orchestrator {
    pub fn new(store: SessionStore, backend: BackendBox, max_context_messages: usize) -> Orchestrator {
        return Orchestrator {
            store,
            backend,
            sessions: vec![],
            current: 0,
            session_counter: 0,
            max_context_messages,
            pending: None,
        };
    }

    pub fn backend(&self) -> &BackendBox {
        return &self.backend;
    }

    pub fn store(&self) -> &SessionStore {
        return &self.store;
    }

    pub fn sessions(&self) -> &[SessionEntry] {
        return &self.sessions;
    }

    pub fn current(&self) -> Option<&SessionEntry> {
        return self.sessions.get(self.current);
    }

    pub fn current_index(&self) -> usize {
        return self.current;
    }

    pub fn state(&self) -> TurnState {
        if self.pending.is_some() {
            return TurnState::AwaitingReply;
        }

        return TurnState::Idle;
    }

    /// The reply accumulated so far for the turn in flight.
    pub fn pending_reply(&self) -> Option<&str> {
        return self
            .pending
            .as_ref()
            .map(|pending| return pending.reply.as_str());
    }

    fn push_entry(&mut self, id: &str, messages: Vec<Message>) -> usize {
        self.session_counter += 1;
        let name = format!("Session {}", self.session_counter);
        self.sessions.push(SessionEntry::new(id, &name, messages));

        return self.sessions.len() - 1;
    }

    fn ensure_idle(&self) -> Result<(), TurnError> {
        if self.pending.is_some() {
            return Err(TurnError::Busy);
        }

        return Ok(());
    }

    /// Fills the working set from the store. `initial` picks the session to
    /// open, bringing it back if it had been archived. Without one, the
    /// newest session is opened, or a fresh one when the store has none.
    pub async fn load(&mut self, initial: Option<&str>) -> Result<(), TurnError> {
        self.ensure_idle()?;

        self.sessions.clear();
        self.current = 0;

        for record in self.store.list_sessions().await? {
            let messages = self.store.list_messages(&record.id).await?;
            self.push_entry(&record.id, messages);
        }

        if let Some(initial_id) = initial {
            let id = self.store.get_or_create_session(Some(initial_id)).await?;
            match self.sessions.iter().position(|entry| return entry.id == id) {
                Some(idx) => {
                    self.current = idx;
                }
                None => {
                    self.store.restore_session(&id).await?;
                    let messages = self.store.list_messages(&id).await?;
                    self.current = self.push_entry(&id, messages);
                }
            }
        } else if self.sessions.is_empty() {
            self.new_session().await?;
        } else {
            self.current = self.sessions.len() - 1;
        }

        tracing::info!(
            sessions = self.sessions.len(),
            current = ?self.current().map(|entry| return entry.id.to_string()),
            "loaded sessions"
        );

        return Ok(());
    }

    pub async fn new_session(&mut self) -> Result<&SessionEntry, TurnError> {
        self.ensure_idle()?;

        let id = self.store.create_session().await?;
        self.current = self.push_entry(&id, vec![]);

        return Ok(&self.sessions[self.current]);
    }

    pub fn select_session(&mut self, id: &str) -> Result<(), TurnError> {
        self.ensure_idle()?;

        let idx = self
            .sessions
            .iter()
            .position(|entry| return entry.id == id)
            .ok_or_else(|| return TurnError::UnknownSession(id.to_string()))?;
        self.current = idx;

        return Ok(());
    }

    /// Moves the current pointer by `offset`, wrapping at both ends.
    pub fn cycle_session(&mut self, offset: isize) -> Result<(), TurnError> {
        self.ensure_idle()?;

        if self.sessions.is_empty() {
            return Ok(());
        }

        let len = self.sessions.len() as isize;
        self.current = (self.current as isize + offset).rem_euclid(len) as usize;

        return Ok(());
    }

    /// Removes a session from the working set and archives it. Its messages
    /// stay in the store.
    pub async fn delete_session(&mut self, id: &str) -> Result<(), TurnError> {
        self.ensure_idle()?;

        let idx = self
            .sessions
            .iter()
            .position(|entry| return entry.id == id)
            .ok_or_else(|| return TurnError::UnknownSession(id.to_string()))?;

        self.store.archive_session(id).await?;
        self.sessions.remove(idx);

        if self.sessions.is_empty() {
            self.new_session().await?;
        } else if idx == self.current {
            self.current = 0;
        } else if idx < self.current {
            self.current -= 1;
        }

        return Ok(());
    }

    /// Persists the user message, caches it, then asks the backend for a
    /// reply. The returned stream must be drained into `push_fragment`
    /// followed by `finish_turn`, or `abandon_turn` on failure.
    pub async fn begin_turn(&mut self, text: &str) -> Result<ReplyStream, TurnError> {
        self.ensure_idle()?;

        if text.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let session_id = self
            .current()
            .map(|entry| return entry.id.to_string())
            .ok_or_else(|| return TurnError::UnknownSession("".to_string()))?;

        let user_message_id = self
            .store
            .append_message(&session_id, Role::User, text, None)
            .await?;

        let entry = &mut self.sessions[self.current];
        entry.messages.push(Message::new(Role::User, text));

        let mut context: &[Message] = &entry.messages;
        if self.max_context_messages > 0 && context.len() > self.max_context_messages {
            context = &context[context.len() - self.max_context_messages..];
        }

        tracing::debug!(
            session_id,
            context_messages = context.len(),
            "requesting reply"
        );

        let stream = self.backend.stream_reply(context).await?;
        self.pending = Some(PendingTurn {
            session_id,
            user_message_id,
            reply: "".to_string(),
        });

        return Ok(stream);
    }

    /// Appends a fragment to the reply in flight and returns the reply so
    /// far.
    pub fn push_fragment(&mut self, text: &str) -> Result<&str, TurnError> {
        let pending = self.pending.as_mut().ok_or(TurnError::NotAwaiting)?;
        pending.reply += text;

        return Ok(&pending.reply);
    }

    /// Persists the completed reply against the user message it answers and
    /// returns to idle. An empty reply is dropped like an abandoned turn.
    pub async fn finish_turn(&mut self) -> Result<String, TurnError> {
        let pending = self.pending.take().ok_or(TurnError::NotAwaiting)?;

        if pending.reply.is_empty() {
            tracing::warn!(
                session_id = %pending.session_id,
                "Dropping empty reply"
            );
            return Err(TurnError::Completion(CompletionError::Malformed {
                backend: self.backend.name(),
                reason: "empty reply".to_string(),
            }));
        }

        self.store
            .append_message(
                &pending.session_id,
                Role::Assistant,
                &pending.reply,
                Some(pending.user_message_id),
            )
            .await?;

        if let Some(entry) = self
            .sessions
            .iter_mut()
            .find(|entry| return entry.id == pending.session_id)
        {
            entry
                .messages
                .push(Message::new(Role::Assistant, &pending.reply));
        }

        return Ok(pending.reply);
    }

    /// Drops the partial reply. The user message stays persisted.
    pub fn abandon_turn(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::info!(
                session_id = %pending.session_id,
                dropped_len = pending.reply.len(),
                "abandoned turn"
            );
        }
    }

    /// Runs a whole turn. `on_fragment` is called with the accumulated reply
    /// after every fragment.
    pub async fn submit<F>(&mut self, text: &str, mut on_fragment: F) -> Result<String, TurnError>
    where
        F: FnMut(&str),
    {
        let mut stream = self.begin_turn(text).await?;

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    let reply = self.push_fragment(&fragment)?;
                    on_fragment(reply);
                }
                Err(err) => {
                    self.abandon_turn();
                    return Err(TurnError::Completion(err));
                }
            }
        }

        return self.finish_turn().await;
    }
}
