pub mod ollama;
pub mod openai;

use futures::stream;
use futures::stream::StreamExt;
use futures::stream::TryStreamExt;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use crate::configuration::Config;
use crate::domain::models::BackendBox;
use crate::domain::models::BackendName;
use crate::domain::models::CompletionError;
use crate::domain::models::ConfigError;
use crate::domain::models::ReplyStream;

pub struct BackendManager {}

impl BackendManager {
    pub fn get(name: BackendName, config: &Config) -> Result<BackendBox, ConfigError> {
        match name {
            BackendName::Ollama => {
                return Ok(Box::new(ollama::Ollama::new(config)?));
            }
            BackendName::OpenAI => {
                return Ok(Box::new(openai::OpenAI::new(config)?));
            }
        }
    }
}

/// One parsed line of a streaming response body.
#[derive(Debug, PartialEq, Eq)]
struct StreamLine {
    fragment: Option<String>,
    done: bool,
}

impl StreamLine {
    fn skip() -> StreamLine {
        return StreamLine {
            fragment: None,
            done: false,
        };
    }

    fn fragment(text: &str) -> StreamLine {
        if text.is_empty() {
            return StreamLine::skip();
        }

        return StreamLine {
            fragment: Some(text.to_string()),
            done: false,
        };
    }

    fn done() -> StreamLine {
        return StreamLine {
            fragment: None,
            done: true,
        };
    }
}

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

/// Sends a completion request, mapping connection failures and non 2xx
/// statuses to their errors.
async fn send_request(
    backend: BackendName,
    req: reqwest::RequestBuilder,
) -> Result<reqwest::Response, CompletionError> {
    let res = req.send().await.map_err(|err| {
        tracing::error!(backend = %backend, error = ?err, "Failed to reach backend");
        return CompletionError::Unreachable {
            backend,
            reason: err.to_string(),
        };
    })?;

    if !res.status().is_success() {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        tracing::error!(
            backend = %backend,
            status,
            body,
            "Failed to make completion request"
        );
        return Err(CompletionError::Rejected {
            backend,
            status,
            body,
        });
    }

    return Ok(res);
}

/// Turns a line based streaming body into reply fragments. The stream ends
/// at the first `done` line or right after the first error. A body that ends
/// without a `done` line yields `Interrupted`.
fn reply_stream(
    backend: BackendName,
    res: reqwest::Response,
    parse_line: fn(&str) -> Result<StreamLine, CompletionError>,
) -> ReplyStream {
    let lines = StreamReader::new(res.bytes_stream().map_err(convert_err)).lines();

    return stream::unfold(Some(lines), move |state| async move {
        let Some(mut lines) = state else {
            return None;
        };
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    // Lines are only kept in state until the end marker.
                    tracing::error!(backend = %backend, "Reply stream ended early");
                    let err = CompletionError::Interrupted {
                        backend,
                        reason: "stream ended before completion".to_string(),
                    };
                    return Some((Err(err), None));
                }
                Err(err) => {
                    tracing::error!(backend = %backend, error = ?err, "Reply stream broke");
                    let err = CompletionError::Interrupted {
                        backend,
                        reason: err.to_string(),
                    };
                    return Some((Err(err), None));
                }
            };

            match parse_line(&line) {
                Ok(StreamLine {
                    fragment: Some(text),
                    done,
                }) => {
                    if done {
                        return Some((Ok(text), None));
                    }
                    return Some((Ok(text), Some(lines)));
                }
                Ok(StreamLine {
                    fragment: None,
                    done: true,
                }) => {
                    return None;
                }
                Ok(_) => continue,
                Err(err) => {
                    tracing::error!(backend = %backend, error = ?err, "Reply stream failed");
                    return Some((Err(err), None));
                }
            }
        }
    })
    .boxed();
}
