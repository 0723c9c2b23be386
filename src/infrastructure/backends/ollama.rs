#[cfg(test)]
#[path = "ollama_test.rs"]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::reply_stream;
use super::send_request;
use super::StreamLine;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::BackendPrompt;
use crate::domain::models::CompletionError;
use crate::domain::models::ConfigError;
use crate::domain::models::Message;
use crate::domain::models::PromptMessage;
use crate::domain::models::ReplyStream;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionOptions {
    temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<PromptMessage>,
    options: CompletionOptions,
    stream: bool,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    message: Option<PromptMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Model {
    name: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ModelListResponse {
    pub models: Vec<Model>,
}

/// Parses one newline delimited JSON line of a chat stream.
fn parse_line(line: &str) -> Result<StreamLine, CompletionError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(StreamLine::skip());
    }

    let ores: CompletionResponse =
        serde_json::from_str(line).map_err(|err| return CompletionError::Malformed {
            backend: BackendName::Ollama,
            reason: format!("{err}: {line}"),
        })?;
    tracing::debug!(body = ?ores, "Completion response");

    if let Some(err) = ores.error {
        return Err(CompletionError::Interrupted {
            backend: BackendName::Ollama,
            reason: err,
        });
    }

    let mut res = StreamLine::fragment(
        ores.message
            .as_ref()
            .map(|message| return message.content.as_str())
            .unwrap_or_default(),
    );
    res.done = ores.done;

    return Ok(res);
}

pub struct Ollama {
    url: String,
    model: String,
    temperature: f32,
    system_prompt: String,
    timeout: u64,
}

impl Ollama {
    pub fn new(config: &Config) -> Result<Ollama, ConfigError> {
        return Ok(Ollama {
            url: config.get(ConfigKey::OllamaURL).trim_end_matches('/').to_string(),
            model: config.get(ConfigKey::Model),
            temperature: config.temperature()?,
            system_prompt: config.get(ConfigKey::SystemPrompt),
            timeout: config.backend_health_check_timeout()?,
        });
    }

    fn completion_request(&self, transcript: &[Message]) -> CompletionRequest {
        let mut prompt = BackendPrompt::new(transcript);
        prompt.append_system_prompt(&self.system_prompt);

        return CompletionRequest {
            model: self.model.to_string(),
            messages: prompt.messages,
            options: CompletionOptions {
                temperature: self.temperature,
            },
            stream: true,
        };
    }
}

#[async_trait]
impl Backend for Ollama {
    fn name(&self) -> BackendName {
        return BackendName::Ollama;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<(), CompletionError> {
        if self.url.is_empty() {
            return Err(CompletionError::NotConfigured {
                backend: self.name(),
                reason: "Ollama URL is not defined".to_string(),
            });
        }

        let res = reqwest::Client::new()
            .get(&self.url)
            .timeout(Duration::from_millis(self.timeout))
            .send()
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "Ollama is not running");
                return CompletionError::Unreachable {
                    backend: BackendName::Ollama,
                    reason: err.to_string(),
                };
            })?;

        if res.status() != 200 {
            let status = res.status().as_u16();
            tracing::error!(status, "Ollama health check failed");
            return Err(CompletionError::Rejected {
                backend: self.name(),
                status,
                body: res.text().await.unwrap_or_default(),
            });
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        let req = reqwest::Client::new().get(format!("{url}/api/tags", url = self.url));
        let res = send_request(self.name(), req)
            .await?
            .json::<ModelListResponse>()
            .await
            .map_err(|err| {
                return CompletionError::Malformed {
                    backend: BackendName::Ollama,
                    reason: err.to_string(),
                };
            })?;

        let mut models: Vec<String> = res
            .models
            .iter()
            .map(|model| {
                return model.name.to_string();
            })
            .collect();

        models.sort();

        return Ok(models);
    }

    #[allow(clippy::implicit_return)]
    async fn stream_reply(&self, transcript: &[Message]) -> Result<ReplyStream, CompletionError> {
        let body = self.completion_request(transcript);
        tracing::debug!(body = ?body, "Completion request");

        let req = reqwest::Client::new()
            .post(format!("{url}/api/chat", url = self.url))
            .json(&body);
        let res = send_request(self.name(), req).await?;

        return Ok(reply_stream(self.name(), res, parse_line));
    }
}
