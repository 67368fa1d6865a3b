use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Cost, MessageId};

/// Configuration problems. None of these are fatal: a missing key
/// switches the front-end into simulation mode.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no API key configured (set {var})")]
    MissingApiKey { var: String },

    #[error("invalid value for '{var}': {value}")]
    InvalidValue { var: String, value: String },

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
}

/// Failures reported by a conversation, audit or knowledge store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("store I/O failed: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {context}")]
    Encode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no document with id '{id}'")]
    NotFound { id: String },
}

/// Stable taxonomy for inference failures, independent of the provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferError {
    #[error("provider rejected the credentials")]
    Unauthorized,

    #[error("provider rate limit reached")]
    RateLimited,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChargeError {
    #[error("event {0} was already charged")]
    AlreadyCharged(MessageId),

    #[error("refusing to charge negative amount {0}")]
    Negative(Cost),
}

/// Reasons a send is refused before anything is charged or stored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SendError {
    #[error("nothing to send")]
    Empty,

    #[error("an inference call is already in flight for this conversation")]
    Busy,

    #[error("conversation session is closed")]
    Closed,

    #[error(transparent)]
    Charge(#[from] ChargeError),
}

#[derive(Error, Debug)]
pub enum ArchitectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to read from stdin")]
    StdinRead(#[from] std::io::Error),

    #[error("Failed to parse JSON")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to write export: {path}")]
    ExportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read knowledge file: {path}")]
    KnowledgeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Knowledge file is empty: {path}")]
    EmptyKnowledge { path: PathBuf },

    #[error("Failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    #[error("Failed to configure thread pool")]
    ThreadPoolInit(#[from] rayon::ThreadPoolBuildError),

    #[error("Task failed")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ArchitectError>;
