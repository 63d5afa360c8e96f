use crate::backend::{Backend, ResultSet, Statement};
use crate::context::CommandContext;
use crate::error::{ApiError, ErrorCode, TaskFault};
use crate::task::{
    AttemptContext, ResultSupplier, RetryPolicy, TargetRef, Task, TaskState, Warning, WarningCode,
};
use crate::tasks::embedding::VectorSlot;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// A document to insert. The vector, if any, is read when the attempt is built.
#[derive(Debug, Clone)]
pub struct InsertRow {
    pub doc_id: Value,
    pub document: Value,
    pub vector: Option<VectorSlot>,
}

impl InsertRow {
    pub fn new(doc_id: Value, document: Value) -> Self {
        Self {
            doc_id,
            document,
            vector: None,
        }
    }

    pub fn with_vector(mut self, slot: VectorSlot) -> Self {
        self.vector = Some(slot);
        self
    }
}

/// What a [`DbTask`] does against the backend
#[derive(Debug, Clone)]
pub enum DbOperation {
    Read {
        statement: Statement,
        /// Column types of the projection, reported once per response
        projection_schema: Option<Value>,
    },
    Insert(InsertRow),
    /// DDL; with `if_not_exists` an existing object is not an error
    Schema {
        statement: Statement,
        if_not_exists: bool,
    },
    /// Prebuilt update, delete or truncate
    Modify(Statement),
}

impl DbOperation {
    pub fn read(statement: Statement) -> Self {
        DbOperation::Read {
            statement,
            projection_schema: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DbOperation::Read { .. } => "read",
            DbOperation::Insert(_) => "insert",
            DbOperation::Schema { .. } => "schema",
            DbOperation::Modify(_) => "modify",
        }
    }
}

/// One statement against the backend
pub struct DbTask {
    state: TaskState,
    backend: Arc<dyn Backend>,
    operation: DbOperation,
    result: OnceLock<ResultSet>,
}

impl DbTask {
    pub fn new(
        position: usize,
        target: TargetRef,
        operation: DbOperation,
        backend: Arc<dyn Backend>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let state = TaskState::new(position, target, retry_policy);
        state.mark_ready();
        Self {
            state,
            backend,
            operation,
            result: OnceLock::new(),
        }
    }

    pub fn with_suppressed_warnings(mut self, codes: Vec<WarningCode>) -> Self {
        self.state = self.state.with_suppressed_warnings(codes);
        self
    }

    pub fn operation(&self) -> &DbOperation {
        &self.operation
    }

    /// Result set of the successful attempt, if there was one
    pub fn result(&self) -> Option<&ResultSet> {
        self.result.get()
    }

    pub fn rows(&self) -> &[Value] {
        self.result
            .get()
            .map(|result| result.rows.as_slice())
            .unwrap_or_default()
    }

    pub fn doc_id(&self) -> Option<&Value> {
        match &self.operation {
            DbOperation::Insert(row) => Some(&row.doc_id),
            _ => None,
        }
    }

    pub fn projection_schema(&self) -> Option<&Value> {
        match &self.operation {
            DbOperation::Read {
                projection_schema, ..
            } => projection_schema.as_ref(),
            _ => None,
        }
    }

    fn statement(&self) -> Result<Statement, TaskFault> {
        match &self.operation {
            DbOperation::Read { statement, .. }
            | DbOperation::Schema { statement, .. }
            | DbOperation::Modify(statement) => Ok(statement.clone()),
            DbOperation::Insert(row) => self.insert_statement(row),
        }
    }

    /// Conditional inserts never write a row twice, so they are safe to repeat
    fn insert_statement(&self, row: &InsertRow) -> Result<Statement, TaskFault> {
        let target = self.state.target();
        let doc_json = Value::String(row.document.to_string());

        let Some(slot) = &row.vector else {
            return Ok(Statement::new(format!(
                "INSERT INTO {target} (key, doc_json) VALUES (?, ?) IF NOT EXISTS"
            ))
            .with_values(vec![row.doc_id.clone(), doc_json])
            .idempotent(true));
        };

        let vector = slot.get().ok_or_else(|| {
            ApiError::new(
                ErrorCode::EmbeddingVectorMissing,
                format!("No vector was generated for document {}", row.doc_id),
            )
        })?;
        Ok(Statement::new(format!(
            "INSERT INTO {target} (key, doc_json, query_vector) VALUES (?, ?, ?) IF NOT EXISTS"
        ))
        .with_values(vec![row.doc_id.clone(), doc_json, Value::from(vector.clone())])
        .idempotent(true))
    }
}

impl Task for DbTask {
    type Output = ResultSet;

    fn state(&self) -> &TaskState {
        &self.state
    }

    fn build_result_supplier(&self, _ctx: &CommandContext) -> ResultSupplier<ResultSet> {
        let statement = match self.statement() {
            Ok(statement) => statement,
            Err(fault) => {
                return ResultSupplier::failing(
                    format!("{} on {}", self.operation.kind(), self.state.target()),
                    fault,
                );
            }
        };

        let backend = Arc::clone(&self.backend);
        let conditional_insert = self.doc_id().cloned();
        ResultSupplier::new(statement.describe(), move || async move {
            let result = backend.execute(statement).await?;
            match conditional_insert {
                Some(doc_id) if !result.applied => Err(TaskFault::AlreadyExists(format!(
                    "document with _id {doc_id}"
                ))),
                _ => Ok(result),
            }
        })
    }

    fn map_fault(&self, attempt: &AttemptContext, fault: TaskFault) -> Option<ApiError> {
        match (&self.operation, fault) {
            (
                DbOperation::Schema {
                    if_not_exists: true,
                    ..
                },
                TaskFault::AlreadyExists(what),
            ) => {
                self.add_warning(Warning::new(
                    WarningCode::SchemaObjectExists,
                    format!("{what} already exists, nothing to do"),
                ));
                None
            }
            (DbOperation::Insert(row), TaskFault::AlreadyExists(_)) => Some(ApiError::new(
                ErrorCode::DocumentAlreadyExists,
                format!("Document already exists with the given _id {}", row.doc_id),
            )),
            (_, fault) => Some(ApiError::from_fault(fault, &attempt.description)),
        }
    }

    fn on_success(&self, result: ResultSet) {
        for warning in &result.warnings {
            self.add_warning(Warning::new(WarningCode::DatabaseWarning, warning.clone()));
        }
        debug!(
            kind = self.operation.kind(),
            backend = self.backend.backend_name(),
            rows = result.rows.len(),
            "Statement executed"
        );
        let _ = self.result.set(result);
    }
}
