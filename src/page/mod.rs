//! Response shape and the result pages that build it from terminal tasks.
//!
//! Every page sorts its tasks by position, lifts each failed task's error and
//! every task's visible warnings, then lets the concrete page add its own data.

pub mod composite;
pub mod db;

#[cfg(test)]
mod tests;

pub use composite::*;
pub use db::*;

use crate::error::ApiError;
use crate::task::{Deferred, Task, TaskAccumulator, TaskId, TaskStatus, Warning};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::error;

/// The outward response of one command
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub status: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseData {
    pub documents: Vec<Value>,
}

impl CommandResult {
    pub fn documents(&self) -> &[Value] {
        self.data
            .as_ref()
            .map(|data| data.documents.as_slice())
            .unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Default)]
pub struct CommandResultBuilder {
    documents: Option<Vec<Value>>,
    status: BTreeMap<String, Value>,
    errors: Vec<ApiError>,
    warnings: Vec<Warning>,
}

impl CommandResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the response as carrying documents, even if none are added
    pub fn with_documents(mut self) -> Self {
        self.documents.get_or_insert_with(Vec::new);
        self
    }

    pub fn add_document(&mut self, document: Value) {
        self.documents.get_or_insert_with(Vec::new).push(document);
    }

    pub fn add_status(&mut self, key: impl Into<String>, value: Value) {
        self.status.insert(key.into(), value);
    }

    pub fn add_error(&mut self, error: ApiError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn build(self) -> CommandResult {
        CommandResult {
            data: self.documents.map(|documents| ResponseData { documents }),
            status: self.status,
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

/// Terminal tasks of one run, sorted by position
pub struct ResultPage<T> {
    tasks: Vec<Arc<T>>,
}

impl<T: Task> ResultPage<T> {
    pub fn new(mut tasks: Vec<Arc<T>>) -> Self {
        tasks.sort_by_key(|task| task.position());
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Arc<T>] {
        &self.tasks
    }

    /// Builder seeded with one error per failed task and all visible warnings
    pub fn builder(&self) -> CommandResultBuilder {
        let mut builder = CommandResultBuilder::new();
        for task in &self.tasks {
            if task.status() == TaskStatus::Error
                && let Some(failure) = task.failure()
            {
                builder.add_error(failure.clone());
            }
            for warning in task.state().visible_warnings() {
                builder.add_warning(warning);
            }
        }
        builder
    }
}

/// Task storage shared by the accumulators
#[derive(Debug)]
pub struct AccumulatedTasks<T> {
    tasks: Vec<Arc<T>>,
    seen: HashSet<TaskId>,
}

impl<T: Task> AccumulatedTasks<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn push(&mut self, task: Arc<T>) {
        if !self.seen.insert(task.task_id()) {
            error!(task_id = %task.task_id(), "Task accumulated twice, ignoring");
            return;
        }
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Sorted snapshot for building a page
    pub fn page(&self) -> ResultPage<T> {
        ResultPage::new(self.tasks.clone())
    }
}

impl<T: Task> Default for AccumulatedTasks<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulator for pipeline stages whose only job is to prepare a later stage.
///
/// Its page carries the stage's errors and warnings and nothing else.
pub struct IntermediateAccumulator<T> {
    tasks: AccumulatedTasks<T>,
}

impl<T: Task> IntermediateAccumulator<T> {
    pub fn new() -> Self {
        Self {
            tasks: AccumulatedTasks::new(),
        }
    }
}

impl<T: Task> Default for IntermediateAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> TaskAccumulator<T> for IntermediateAccumulator<T> {
    fn accumulate(&mut self, task: Arc<T>) {
        self.tasks.push(task);
    }

    fn get_results(&self) -> Deferred<CommandResult> {
        let page = self.tasks.page();
        Deferred::new(move || page.builder().build())
    }
}
