use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for tasks
pub type TaskId = Uuid;

/// Task lifecycle status
///
/// `Uninitialized -> Ready -> InProgress -> {Completed | Error | Skipped}`.
/// Terminal states never transition further.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task is still being built
    Uninitialized = 0,
    /// Task is fully built and may be executed
    Ready = 1,
    /// Task is currently executing, including retry waits
    InProgress = 2,
    /// Task produced a result
    Completed = 3,
    /// Task carries a failure
    Error = 4,
    /// Task was bypassed because an earlier sibling failed
    Skipped = 5,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Uninitialized => "UNINITIALIZED",
            TaskStatus::Ready => "READY",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Error => "ERROR",
            TaskStatus::Skipped => "SKIPPED",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Uninitialized,
            1 => TaskStatus::Ready,
            2 => TaskStatus::InProgress,
            3 => TaskStatus::Completed,
            5 => TaskStatus::Skipped,
            // Only values written by TaskState are ever stored
            _ => TaskStatus::Error,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codes for non-fatal warnings surfaced in the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// Warning reported by the database alongside a result
    DatabaseWarning,
    /// Query filters on a column without an index
    MissingIndex,
    /// Read had no filter and scans the whole table
    ZeroFiltersProvided,
    /// Embedding input was cut to the provider limit
    EmbeddingInputTruncated,
    /// `if not exists` schema change found the object already present
    SchemaObjectExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// What a task operates on. Opaque to the engine apart from logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetRef {
    Table { keyspace: String, table: String },
    Keyspace(String),
    EmbeddingProvider(String),
    /// Nested pipeline stage
    Stage(String),
}

impl TargetRef {
    pub fn table(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        TargetRef::Table {
            keyspace: keyspace.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Table { keyspace, table } => write!(f, "{}.{}", keyspace, table),
            TargetRef::Keyspace(name) => write!(f, "{}", name),
            TargetRef::EmbeddingProvider(name) => write!(f, "embedding:{}", name),
            TargetRef::Stage(name) => write!(f, "stage:{}", name),
        }
    }
}
