use crate::page::{AccumulatedTasks, CommandResult};
use crate::task::{Deferred, Task, TaskAccumulator, TaskStatus};
use crate::tasks::DbTask;
use serde_json::{Value, json};
use std::sync::Arc;

/// Documents from every completed read, in position order
#[derive(Default)]
pub struct ReadAccumulator {
    tasks: AccumulatedTasks<DbTask>,
}

impl ReadAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskAccumulator<DbTask> for ReadAccumulator {
    fn accumulate(&mut self, task: Arc<DbTask>) {
        self.tasks.push(task);
    }

    fn get_results(&self) -> Deferred<CommandResult> {
        let page = self.tasks.page();
        Deferred::new(move || {
            let mut builder = page.builder().with_documents();
            for task in page.tasks() {
                if task.status() == TaskStatus::Completed {
                    for row in task.rows() {
                        builder.add_document(row.clone());
                    }
                }
            }
            if let Some(schema) = page.tasks().iter().find_map(|t| t.projection_schema()) {
                builder.add_status("projectionSchema", schema.clone());
            }
            builder.build()
        })
    }
}

/// Ids of inserted documents, optionally with a per-document outcome
#[derive(Default)]
pub struct InsertAccumulator {
    tasks: AccumulatedTasks<DbTask>,
    document_responses: bool,
}

impl InsertAccumulator {
    pub fn new(document_responses: bool) -> Self {
        Self {
            tasks: AccumulatedTasks::new(),
            document_responses,
        }
    }
}

impl TaskAccumulator<DbTask> for InsertAccumulator {
    fn accumulate(&mut self, task: Arc<DbTask>) {
        self.tasks.push(task);
    }

    fn get_results(&self) -> Deferred<CommandResult> {
        let page = self.tasks.page();
        let document_responses = self.document_responses;
        Deferred::new(move || {
            let mut builder = page.builder();
            let mut inserted_ids = Vec::new();
            let mut responses = Vec::new();
            // Page errors are added in position order, one per failed task
            let mut error_index = 0usize;

            for task in page.tasks() {
                let doc_id = task.doc_id().cloned().unwrap_or(Value::Null);
                let response = match task.status() {
                    TaskStatus::Completed => {
                        inserted_ids.push(doc_id.clone());
                        json!({ "_id": doc_id, "status": "OK" })
                    }
                    TaskStatus::Error if task.failure().is_some() => {
                        let response =
                            json!({ "_id": doc_id, "status": "ERROR", "errorsIdx": [error_index] });
                        error_index += 1;
                        response
                    }
                    _ => json!({ "_id": doc_id, "status": "SKIPPED" }),
                };
                responses.push(response);
            }

            builder.add_status("insertedIds", Value::Array(inserted_ids));
            if document_responses {
                builder.add_status("documentResponses", Value::Array(responses));
            }
            builder.build()
        })
    }
}

/// Acknowledges schema changes and modifications with `ok: 1`
#[derive(Default)]
pub struct SchemaAccumulator {
    tasks: AccumulatedTasks<DbTask>,
}

impl SchemaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskAccumulator<DbTask> for SchemaAccumulator {
    fn accumulate(&mut self, task: Arc<DbTask>) {
        self.tasks.push(task);
    }

    fn get_results(&self) -> Deferred<CommandResult> {
        let page = self.tasks.page();
        Deferred::new(move || {
            let mut builder = page.builder();
            if builder.error_count() == 0 {
                builder.add_status("ok", json!(1));
            }
            builder.build()
        })
    }
}
