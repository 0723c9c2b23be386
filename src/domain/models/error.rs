use thiserror::Error;

use super::BackendName;

/// Startup configuration failures. These are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found at {0}")]
    NotFound(String),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path} is not valid TOML: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Config has an invalid value for key '{key}': {value}\n{reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session {0} does not exist")]
    SessionNotFound(String),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Database returned a malformed row: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("{backend} is not configured: {reason}")]
    NotConfigured {
        backend: BackendName,
        reason: String,
    },

    #[error("{backend} is not reachable: {reason}")]
    Unreachable {
        backend: BackendName,
        reason: String,
    },

    #[error("{backend} rejected the request with status {status}: {body}")]
    Rejected {
        backend: BackendName,
        status: u16,
        body: String,
    },

    #[error("{backend} stopped streaming the reply: {reason}")]
    Interrupted {
        backend: BackendName,
        reason: String,
    },

    #[error("{backend} returned a response that could not be read: {reason}")]
    Malformed {
        backend: BackendName,
        reason: String,
    },
}

/// Failures of a single orchestrator operation. None of these are fatal.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("A reply is still being generated, wait for it to finish.")]
    Busy,

    #[error("Cannot send an empty message.")]
    EmptyInput,

    #[error("No reply is being generated.")]
    NotAwaiting,

    #[error("Session {0} is not open.")]
    UnknownSession(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}
