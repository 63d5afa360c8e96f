use crate::backend::{Backend, Statement};
use crate::config::EngineConfig;
use crate::page::ReadAccumulator;
use crate::task::{
    RetryPolicy, RunnableOperation, TargetRef, Task, TaskGroup, TaskOperation, Warning,
    WarningCode,
};
use crate::tasks::{DbOperation, DbTask};
use serde_json::Value;
use std::sync::Arc;

/// One read statement, e.g. one per token range or partition
#[derive(Debug, Clone)]
pub struct ReadStatement {
    pub statement: Statement,
    /// Whether the statement restricts rows at all
    pub filtered: bool,
    /// Filters on columns without an index
    pub unindexed_columns: Vec<String>,
}

impl ReadStatement {
    pub fn new(statement: Statement) -> Self {
        Self {
            statement,
            filtered: true,
            unindexed_columns: Vec::new(),
        }
    }

    pub fn unfiltered(mut self) -> Self {
        self.filtered = false;
        self
    }

    pub fn unindexed(mut self, column: impl Into<String>) -> Self {
        self.unindexed_columns.push(column.into());
        self
    }
}

/// Builds parallel reads whose rows are merged in statement order
pub struct ReadPipeline {
    table: String,
    keyspace: Option<String>,
    backend: Arc<dyn Backend>,
    projection_schema: Option<Value>,
    suppressed: Vec<WarningCode>,
}

impl ReadPipeline {
    pub fn new(table: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            table: table.into(),
            keyspace: None,
            backend,
            projection_schema: None,
            suppressed: Vec::new(),
        }
    }

    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Reported under `status.projectionSchema`
    pub fn projection_schema(mut self, schema: Value) -> Self {
        self.projection_schema = Some(schema);
        self
    }

    /// Keep these warnings off the response
    pub fn suppress_warning(mut self, code: WarningCode) -> Self {
        self.suppressed.push(code);
        self
    }

    pub fn build(
        self,
        statements: Vec<ReadStatement>,
        config: &EngineConfig,
    ) -> Box<dyn RunnableOperation> {
        let keyspace = self
            .keyspace
            .clone()
            .unwrap_or_else(|| config.keyspace.clone());
        let target = TargetRef::table(keyspace, self.table.clone());
        let retry = RetryPolicy::from_config(&config.read);

        let mut group = TaskGroup::parallel();
        for (position, read) in statements.into_iter().enumerate() {
            let operation = DbOperation::Read {
                statement: read.statement,
                // Only the first read carries the schema; the page reports it once
                projection_schema: if position == 0 {
                    self.projection_schema.clone()
                } else {
                    None
                },
            };
            let task = DbTask::new(
                position,
                target.clone(),
                operation,
                Arc::clone(&self.backend),
                retry.clone(),
            )
            .with_suppressed_warnings(self.suppressed.clone());

            if !read.filtered {
                task.add_warning(Warning::new(
                    WarningCode::ZeroFiltersProvided,
                    format!("Read of {target} has no filter and scans the whole table"),
                ));
            }
            for column in &read.unindexed_columns {
                task.add_warning(Warning::new(
                    WarningCode::MissingIndex,
                    format!("Filter on column {column} of {target} is not backed by an index"),
                ));
            }
            group.add(task);
        }

        Box::new(TaskOperation::new(group, ReadAccumulator::new()))
    }
}
