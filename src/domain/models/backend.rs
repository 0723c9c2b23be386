#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;
use strum::EnumString;
use strum::EnumVariantNames;

use super::CompletionError;
use super::Message;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    EnumString,
    EnumVariantNames,
    strum::Display
)]
#[strum(serialize_all = "lowercase")]
pub enum BackendName {
    OpenAI,
    Ollama,
}

impl BackendName {
    pub fn parse(text: &str) -> Option<BackendName> {
        return text.parse::<BackendName>().ok();
    }
}

/// A role/content pair as sent over the wire. Unlike [`Message`] this may
/// carry the `system` role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

/// The ordered context sent to a backend for a single reply.
pub struct BackendPrompt {
    pub messages: Vec<PromptMessage>,
}

impl BackendPrompt {
    pub fn new(transcript: &[Message]) -> BackendPrompt {
        let messages = transcript
            .iter()
            .map(|message| {
                return PromptMessage {
                    role: message.role.to_string(),
                    content: message.content.to_string(),
                };
            })
            .collect();

        return BackendPrompt { messages };
    }

    /// Prepends a system message. Blank prompts are skipped.
    pub fn append_system_prompt(&mut self, system_prompt: &str) {
        if system_prompt.trim().is_empty() {
            return;
        }

        self.messages.insert(
            0,
            PromptMessage {
                role: "system".to_string(),
                content: system_prompt.trim().to_string(),
            },
        );
    }
}

/// Reply fragments in generation order. The stream ends after the last
/// fragment, or right after yielding an error.
pub type ReplyStream = BoxStream<'static, Result<String, CompletionError>>;

#[async_trait]
pub trait Backend {
    fn name(&self) -> BackendName;

    /// Used at startup to verify all configurations are available to work with
    /// the backend.
    async fn health_check(&self) -> Result<(), CompletionError>;

    /// Lists all available models for the backend, sorted.
    async fn list_models(&self) -> Result<Vec<String>, CompletionError>;

    /// Requests a reply for the full transcript, oldest message first. The
    /// backend keeps no state between calls, so all context must be resent
    /// every turn.
    ///
    /// Errors before the first fragment are returned directly. Errors once
    /// streaming has started are yielded as the final stream item.
    async fn stream_reply(&self, transcript: &[Message]) -> Result<ReplyStream, CompletionError>;
}

pub type BackendBox = Box<dyn Backend + Send + Sync>;
