use crate::backend::{Backend, Statement};
use crate::config::EngineConfig;
use crate::page::SchemaAccumulator;
use crate::task::{RetryPolicy, RunnableOperation, TargetRef, TaskGroup, TaskOperation};
use crate::tasks::{DbOperation, DbTask};
use std::sync::Arc;

/// One schema statement of a [`SchemaPipeline`]
#[derive(Debug, Clone)]
pub enum SchemaChange {
    /// DDL such as create table or create index
    Ddl {
        statement: Statement,
        if_not_exists: bool,
    },
    /// Update, delete or truncate run alongside the DDL
    Modify(Statement),
}

impl SchemaChange {
    pub fn ddl(statement: Statement, if_not_exists: bool) -> Self {
        SchemaChange::Ddl {
            statement,
            if_not_exists,
        }
    }
}

/// Builds schema changes that run one after another, e.g. a table then its indexes
pub struct SchemaPipeline {
    keyspace: Option<String>,
    backend: Arc<dyn Backend>,
}

impl SchemaPipeline {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            keyspace: None,
            backend,
        }
    }

    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn build(
        self,
        changes: Vec<SchemaChange>,
        config: &EngineConfig,
    ) -> Box<dyn RunnableOperation> {
        let keyspace = self
            .keyspace
            .clone()
            .unwrap_or_else(|| config.keyspace.clone());
        let target = TargetRef::Keyspace(keyspace);

        let mut group = TaskGroup::sequential();
        for (position, change) in changes.into_iter().enumerate() {
            let (operation, retry) = match change {
                SchemaChange::Ddl {
                    statement,
                    if_not_exists,
                } => (
                    DbOperation::Schema {
                        statement,
                        if_not_exists,
                    },
                    RetryPolicy::from_config(&config.ddl),
                ),
                SchemaChange::Modify(statement) => {
                    let retry = RetryPolicy::for_write(&config.write, statement.idempotent);
                    (DbOperation::Modify(statement), retry)
                }
            };
            group.add(DbTask::new(
                position,
                target.clone(),
                operation,
                Arc::clone(&self.backend),
                retry,
            ));
        }

        Box::new(TaskOperation::new(group, SchemaAccumulator::new()))
    }
}
