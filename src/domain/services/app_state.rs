#[cfg(test)]
#[path = "app_state_test.rs"]
mod tests;

use ratatui::prelude::Rect;
use tokio::sync::mpsc;

use super::actions::help_text;
use super::actions::ActionsService;
use super::BubbleList;
use super::Orchestrator;
use super::Scroll;
use super::TurnState;
use crate::domain::models::CompletionError;
use crate::domain::models::Event;
use crate::domain::models::Loading;
use crate::domain::models::Notice;
use crate::domain::models::SlashCommand;
use crate::domain::models::TextArea;
use crate::domain::models::TurnError;

pub struct AppState<'a> {
    pub orchestrator: Orchestrator,
    pub bubble_list: BubbleList,
    pub info: Option<String>,
    pub last_known_height: u16,
    pub last_known_width: u16,
    pub loading: Loading,
    pub model: String,
    pub notice: Option<Notice>,
    pub scroll: Scroll,
    pub textarea: tui_textarea::TextArea<'a>,
}

impl<'a> AppState<'a> {
    pub fn with_orchestrator(orchestrator: Orchestrator, username: &str, model: &str) -> AppState<'a> {
        let session_name = orchestrator
            .current()
            .map(|entry| return entry.name.to_string())
            .unwrap_or_default();

        return AppState {
            orchestrator,
            bubble_list: BubbleList::new(username, model),
            info: None,
            last_known_height: 0,
            last_known_width: 0,
            loading: Loading::default(),
            model: model.to_string(),
            notice: None,
            scroll: Scroll::default(),
            textarea: TextArea::for_session(&session_name),
        };
    }

    /// Builds the UI state and probes the backend. A failed probe is shown as
    /// a notice; the chat still opens.
    pub async fn new(orchestrator: Orchestrator, username: &str, model: &str) -> AppState<'a> {
        let mut app_state = AppState::with_orchestrator(orchestrator, username, model);
        let backend = app_state.orchestrator.backend();
        let backend_name = backend.name();

        if let Err(err) = backend.health_check().await {
            app_state.notice = Some(Notice::error(&format!(
                "Backend {backend_name} isn't reachable, replies will fail until it is. {err}"
            )));
        } else {
            match backend.list_models().await {
                Ok(models) => {
                    if !models.is_empty() && !models.contains(&model.to_string()) {
                        app_state.notice = Some(Notice::error(&format!(
                            "Model {model} doesn't exist for backend {backend_name}."
                        )));
                    }
                }
                Err(err) => {
                    tracing::warn!(error = ?err, "Failed to list models");
                }
            }
        }

        return app_state;
    }

    pub fn waiting_for_reply(&self) -> bool {
        return self.orchestrator.state() == TurnState::AwaitingReply;
    }

    pub fn session_name(&self) -> String {
        return self
            .orchestrator
            .current()
            .map(|entry| return entry.name.to_string())
            .unwrap_or_default();
    }

    fn reset_textarea(&mut self) {
        self.textarea = TextArea::for_session(&self.session_name());
    }

    fn report(&mut self, err: TurnError) {
        tracing::error!(error = ?err, "Operation failed");
        match err {
            TurnError::Busy => {
                self.notice = Some(Notice::new(&err.to_string()));
            }
            _ => {
                self.notice = Some(Notice::error(&err.to_string()));
            }
        }
    }

    fn session_changed(&mut self) {
        self.info = None;
        self.textarea.set_block(TextArea::block(&self.session_name()));
        self.sync_dependants();
        self.scroll.last();
    }

    /// Sends the prompt input. Returns true when the app should exit.
    pub async fn submit_input(&mut self, tx: &mpsc::UnboundedSender<Event>) -> bool {
        let input_str = self.textarea.lines().join("\n");
        if input_str.trim().is_empty() {
            return false;
        }

        self.info = None;
        if let Some(command) = SlashCommand::parse(&input_str) {
            self.reset_textarea();
            return self.handle_slash_command(command).await;
        }

        match self.orchestrator.begin_turn(&input_str).await {
            Ok(stream) => {
                self.notice = None;
                self.reset_textarea();
                ActionsService::forward_reply(stream, tx.clone());
            }
            Err(err) => {
                // The user message is already saved once the backend is involved.
                if matches!(err, TurnError::Completion(_)) {
                    self.reset_textarea();
                }
                self.report(err);
            }
        }

        self.sync_dependants();
        self.scroll.last();

        return false;
    }

    /// Runs a slash command. Returns true when the app should exit.
    pub async fn handle_slash_command(&mut self, command: SlashCommand) -> bool {
        if command.is_quit() {
            return true;
        }

        if command.is_help() {
            self.info = Some(help_text());
            return false;
        }

        if command.is_list_sessions() {
            let list = self
                .orchestrator
                .sessions()
                .iter()
                .enumerate()
                .map(|(idx, entry)| {
                    return format!(
                        "{}. {} ({} messages) {}",
                        idx + 1,
                        entry.name,
                        entry.messages.len(),
                        entry.id
                    );
                })
                .collect::<Vec<String>>();
            self.info = Some(list.join("\n"));
            return false;
        }

        if command.is_new_session() {
            self.new_session().await;
            return false;
        }

        if command.is_delete_session() {
            self.delete_current_session().await;
            return false;
        }

        if command.is_select_session() {
            let sessions_len = self.orchestrator.sessions().len();
            match command.session_number() {
                Some(number) if number <= sessions_len => {
                    let id = self.orchestrator.sessions()[number - 1].id.to_string();
                    match self.orchestrator.select_session(&id) {
                        Ok(_) => self.session_changed(),
                        Err(err) => self.report(err),
                    }
                }
                _ => {
                    self.notice = Some(Notice::error(&format!(
                        "Use /select with a session number between 1 and {sessions_len}."
                    )));
                }
            }
        }

        return false;
    }

    pub async fn new_session(&mut self) {
        match self.orchestrator.new_session().await {
            Ok(_) => self.session_changed(),
            Err(err) => self.report(err),
        }
    }

    pub async fn delete_current_session(&mut self) {
        let Some(id) = self
            .orchestrator
            .current()
            .map(|entry| return entry.id.to_string())
        else {
            return;
        };

        match self.orchestrator.delete_session(&id).await {
            Ok(_) => {
                self.notice = Some(Notice::new(&format!(
                    "Closed session {id}. Its messages are kept, reopen it with `parley sessions open --id {id}`."
                )));
                self.session_changed();
            }
            Err(err) => self.report(err),
        }
    }

    pub fn cycle_session(&mut self, offset: isize) {
        match self.orchestrator.cycle_session(offset) {
            Ok(_) => self.session_changed(),
            Err(err) => self.report(err),
        }
    }

    pub fn handle_reply_fragment(&mut self, text: &str) {
        if let Err(err) = self.orchestrator.push_fragment(text) {
            tracing::warn!(error = ?err, "Dropped a reply fragment");
            return;
        }

        self.sync_dependants();
    }

    pub async fn handle_reply_done(&mut self) {
        if let Err(err) = self.orchestrator.finish_turn().await {
            self.report(err);
        }

        self.sync_dependants();
    }

    pub fn handle_reply_failed(&mut self, err: CompletionError) {
        self.orchestrator.abandon_turn();
        self.report(TurnError::Completion(err));
        self.sync_dependants();
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.last_known_width = rect.width;
        self.last_known_height = rect.height;
        self.sync_dependants();
    }

    fn sync_dependants(&mut self) {
        if let Some(entry) = self.orchestrator.current() {
            self.bubble_list.set_messages(
                &entry.id,
                &entry.messages,
                self.orchestrator.pending_reply(),
                self.last_known_width as usize,
            );
        }

        self.scroll.set_state(
            self.bubble_list.len().try_into().unwrap_or(u16::MAX),
            self.last_known_height,
        );
    }
}
