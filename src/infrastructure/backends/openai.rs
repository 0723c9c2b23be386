#[cfg(test)]
#[path = "openai_test.rs"]
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

const OFFICIAL_URL: &str = "https://api.openai.com";

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Model {
    id: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ModelListResponse {
    data: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<PromptMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionDeltaResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionChoiceResponse {
    delta: CompletionDeltaResponse,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionErrorResponse {
    #[serde(default)]
    message: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoiceResponse>,
    #[serde(default)]
    error: Option<CompletionErrorResponse>,
}

/// Parses one server-sent events line of a chat completion stream.
fn parse_line(line: &str) -> Result<StreamLine, CompletionError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments, and `event:` fields carry no content.
        return Ok(StreamLine::skip());
    };

    let data = data.trim();
    if data.is_empty() {
        return Ok(StreamLine::skip());
    }
    if data == "[DONE]" {
        return Ok(StreamLine::done());
    }

    let ores: CompletionResponse =
        serde_json::from_str(data).map_err(|err| return CompletionError::Malformed {
            backend: BackendName::OpenAI,
            reason: format!("{err}: {data}"),
        })?;
    tracing::debug!(body = ?ores, "Completion response");

    if let Some(err) = ores.error {
        return Err(CompletionError::Interrupted {
            backend: BackendName::OpenAI,
            reason: err.message,
        });
    }

    let text = ores
        .choices
        .first()
        .and_then(|choice| return choice.delta.content.as_deref())
        .unwrap_or_default();

    return Ok(StreamLine::fragment(text));
}

pub struct OpenAI {
    url: String,
    token: String,
    model: String,
    temperature: f32,
    system_prompt: String,
    timeout: u64,
}

impl OpenAI {
    pub fn new(config: &Config) -> Result<OpenAI, ConfigError> {
        return Ok(OpenAI {
            url: config.get(ConfigKey::OpenaiURL).trim_end_matches('/').to_string(),
            token: config.get(ConfigKey::OpenaiToken),
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
            temperature: self.temperature,
            stream: true,
        };
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            return req;
        }

        return req.header("Authorization", format!("Bearer {}", self.token));
    }
}

#[async_trait]
impl Backend for OpenAI {
    fn name(&self) -> BackendName {
        return BackendName::OpenAI;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<(), CompletionError> {
        if self.url.is_empty() {
            return Err(CompletionError::NotConfigured {
                backend: self.name(),
                reason: "OpenAI URL is not defined".to_string(),
            });
        }

        // The official API answers its index with 404 or 418, so only the
        // token can be checked up front.
        if self.url == OFFICIAL_URL {
            if self.token.is_empty() {
                return Err(CompletionError::NotConfigured {
                    backend: self.name(),
                    reason: "OpenAI token is not defined".to_string(),
                });
            }

            return Ok(());
        }

        let res = reqwest::Client::new()
            .get(&self.url)
            .timeout(Duration::from_millis(self.timeout))
            .send()
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "OpenAI is not reachable");
                return CompletionError::Unreachable {
                    backend: BackendName::OpenAI,
                    reason: err.to_string(),
                };
            })?;

        let status = res.status().as_u16();
        if status >= 500 {
            tracing::error!(status, "OpenAI health check failed");
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
        let req = self.authorized(
            reqwest::Client::new().get(format!("{url}/v1/models", url = self.url)),
        );
        let res = send_request(self.name(), req)
            .await?
            .json::<ModelListResponse>()
            .await
            .map_err(|err| {
                return CompletionError::Malformed {
                    backend: BackendName::OpenAI,
                    reason: err.to_string(),
                };
            })?;

        let mut models: Vec<String> = res
            .data
            .iter()
            .map(|model| {
                return model.id.to_string();
            })
            .collect();

        models.sort();

        return Ok(models);
    }

    #[allow(clippy::implicit_return)]
    async fn stream_reply(&self, transcript: &[Message]) -> Result<ReplyStream, CompletionError> {
        let body = self.completion_request(transcript);
        tracing::debug!(body = ?body, "Completion request");

        let req = self.authorized(
            reqwest::Client::new()
                .post(format!("{url}/v1/chat/completions", url = self.url))
                .json(&body),
        );
        let res = send_request(self.name(), req).await?;

        return Ok(reply_stream(self.name(), res, parse_line));
    }
}
