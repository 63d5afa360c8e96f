//! Error types shared by the engine and its collaborators.
//!
//! Three layers are kept apart:
//! - [`TaskFault`]: a raw fault raised while a task attempt runs (driver
//!   timeouts, provider failures). Classified by [`IsRetryable`].
//! - [`ApiError`]: the user-presentable error a task ends up carrying once
//!   retries are exhausted and the fault has been mapped.
//! - [`EngineError`]: post-run sanity failures that indicate an engine bug and
//!   are allowed to halt the request.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Trait for faults that can be classified as retryable or not
///
/// Transient failures (timeouts, unavailable replicas, overloaded nodes) return `true`.
/// Permanent failures (invalid queries, conflicts, bad input) return `false`.
pub trait IsRetryable {
    /// Returns true if the fault is transient and the attempt may be repeated
    fn is_retryable(&self) -> bool;
}

/// Raw fault raised by a task's result supplier.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskFault {
    #[error("read timeout: {0}")]
    ReadTimeout(String),
    #[error("write timeout: {0}")]
    WriteTimeout(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend overloaded: {0}")]
    Overloaded(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("embedding provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("embedding provider timed out: {0}")]
    ProviderTimeout(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IsRetryable for TaskFault {
    fn is_retryable(&self) -> bool {
        match self {
            TaskFault::ReadTimeout(_)
            | TaskFault::WriteTimeout(_)
            | TaskFault::Unavailable(_)
            | TaskFault::Overloaded(_)
            | TaskFault::ProviderTimeout(_) => true,
            // Rate limited or server side trouble at the provider
            TaskFault::Provider { status, .. } => *status == 429 || *status >= 500,
            TaskFault::InvalidQuery(_)
            | TaskFault::AlreadyExists(_)
            | TaskFault::Api(_)
            | TaskFault::Internal(_) => false,
        }
    }
}

/// Which side of the request an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorFamily {
    Request,
    Server,
}

/// Stable codes for user-visible errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DatabaseReadTimeout,
    DatabaseWriteTimeout,
    DatabaseUnavailable,
    DatabaseOverloaded,
    InvalidQuery,
    AlreadyExists,
    DocumentAlreadyExists,
    InvalidDocument,
    EmbeddingProviderError,
    EmbeddingProviderTimeout,
    EmbeddingVectorMissing,
    TaskStateInvalid,
    UnexpectedServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseReadTimeout => "DATABASE_READ_TIMEOUT",
            ErrorCode::DatabaseWriteTimeout => "DATABASE_WRITE_TIMEOUT",
            ErrorCode::DatabaseUnavailable => "DATABASE_UNAVAILABLE",
            ErrorCode::DatabaseOverloaded => "DATABASE_OVERLOADED",
            ErrorCode::InvalidQuery => "INVALID_QUERY",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::DocumentAlreadyExists => "DOCUMENT_ALREADY_EXISTS",
            ErrorCode::InvalidDocument => "INVALID_DOCUMENT",
            ErrorCode::EmbeddingProviderError => "EMBEDDING_PROVIDER_ERROR",
            ErrorCode::EmbeddingProviderTimeout => "EMBEDDING_PROVIDER_TIMEOUT",
            ErrorCode::EmbeddingVectorMissing => "EMBEDDING_VECTOR_MISSING",
            ErrorCode::TaskStateInvalid => "TASK_STATE_INVALID",
            ErrorCode::UnexpectedServerError => "UNEXPECTED_SERVER_ERROR",
        }
    }

    pub fn family(&self) -> ErrorFamily {
        match self {
            ErrorCode::InvalidQuery
            | ErrorCode::AlreadyExists
            | ErrorCode::DocumentAlreadyExists
            | ErrorCode::InvalidDocument => ErrorFamily::Request,
            _ => ErrorFamily::Server,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseReadTimeout => "Timed out reading from the database",
            ErrorCode::DatabaseWriteTimeout => "Timed out writing to the database",
            ErrorCode::DatabaseUnavailable => "Database is unavailable",
            ErrorCode::DatabaseOverloaded => "Database is overloaded",
            ErrorCode::InvalidQuery => "Database rejected the query",
            ErrorCode::AlreadyExists => "Schema object already exists",
            ErrorCode::DocumentAlreadyExists => "Document already exists",
            ErrorCode::InvalidDocument => "Document is not a JSON object",
            ErrorCode::EmbeddingProviderError => "Embedding provider request failed",
            ErrorCode::EmbeddingProviderTimeout => "Embedding provider timed out",
            ErrorCode::EmbeddingVectorMissing => "Embedding vector was not generated",
            ErrorCode::TaskStateInvalid => "Internal task state is invalid",
            ErrorCode::UnexpectedServerError => "Unexpected server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-presentable error attached to a task and surfaced in the response.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct ApiError {
    pub id: Uuid,
    pub family: ErrorFamily,
    #[serde(rename = "errorCode")]
    pub code: ErrorCode,
    pub title: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            family: code.family(),
            code,
            title: code.title().to_string(),
            message: message.into(),
        }
    }

    /// Task method was called while the task was in an unexpected status
    pub fn invalid_state(operation: &str, expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorCode::TaskStateInvalid,
            format!("{operation} expected task status {expected} but it was {actual}"),
        )
    }

    /// Translate a raw fault into a domain error, naming what was tried.
    ///
    /// `attempted` is the description of the last attempt, e.g. the statement text,
    /// so the message points at the exact call that failed.
    pub fn from_fault(fault: TaskFault, attempted: &str) -> Self {
        let (code, detail) = match fault {
            TaskFault::Api(error) => return error,
            TaskFault::ReadTimeout(m) => (ErrorCode::DatabaseReadTimeout, m),
            TaskFault::WriteTimeout(m) => (ErrorCode::DatabaseWriteTimeout, m),
            TaskFault::Unavailable(m) => (ErrorCode::DatabaseUnavailable, m),
            TaskFault::Overloaded(m) => (ErrorCode::DatabaseOverloaded, m),
            TaskFault::InvalidQuery(m) => (ErrorCode::InvalidQuery, m),
            TaskFault::AlreadyExists(m) => (ErrorCode::AlreadyExists, m),
            TaskFault::Provider { status, message } => (
                ErrorCode::EmbeddingProviderError,
                format!("HTTP {status}: {message}"),
            ),
            TaskFault::ProviderTimeout(m) => (ErrorCode::EmbeddingProviderTimeout, m),
            TaskFault::Internal(m) => (ErrorCode::UnexpectedServerError, m),
        };
        Self::new(code, format!("{detail} (while executing: {attempted})"))
    }
}

/// Engine level failures that halt the operation instead of landing on a task.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{} task(s) did not reach a terminal state, positions {positions:?}", positions.len())]
    NotAllTerminal { positions: Vec<usize> },
    #[error("operation has already been run")]
    OperationAlreadyRun,
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
