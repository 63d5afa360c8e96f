//! Collaborator seams: the storage backend and embedding providers.
//!
//! The engine never builds statements or speaks provider protocols itself;
//! tasks hold one of these and call it from their result supplier.

pub mod scripted;

pub use scripted::{Behavior, MockEmbeddingProvider, ScriptedBackend};

use crate::error::TaskFault;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;

/// A backend statement with its bound values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub values: Vec<Value>,
    /// Safe to apply more than once
    pub idempotent: bool,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            values: Vec::new(),
            idempotent: true,
        }
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Statement text plus bound values, used in logs and error messages
    pub fn describe(&self) -> String {
        if self.values.is_empty() {
            self.text.clone()
        } else {
            format!("{} {}", self.text, Value::Array(self.values.clone()))
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Rows and metadata returned for one statement
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Value>,
    /// False when a conditional write was not applied
    pub applied: bool,
    /// Warnings the backend attached to the response
    pub warnings: Vec<String>,
}

impl ResultSet {
    pub fn rows(rows: Vec<Value>) -> Self {
        Self {
            rows,
            applied: true,
            warnings: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::rows(Vec::new())
    }

    pub fn not_applied() -> Self {
        Self {
            applied: false,
            ..Self::empty()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Executes statements against the storage backend
pub trait Backend: Send + Sync {
    fn execute(&self, statement: Statement) -> BoxFuture<'_, Result<ResultSet, TaskFault>>;

    fn backend_name(&self) -> &str {
        "backend"
    }
}

/// Turns texts into embedding vectors
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input text, in input order
    fn vectorize(&self, texts: Vec<String>) -> BoxFuture<'_, Result<Vec<Vec<f32>>, TaskFault>>;

    fn provider_name(&self) -> &str;

    fn dimension(&self) -> usize;
}
