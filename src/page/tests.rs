use super::*;
use crate::backend::{Backend, Behavior, ScriptedBackend, Statement};
use crate::context::CommandContext;
use crate::error::{ErrorCode, TaskFault};
use crate::task::{RetryPolicy, TargetRef, TaskGroup, TaskOperation, WarningCode};
use crate::tasks::{DbOperation, DbTask, InsertRow};
use serde_json::json;

fn insert_task(position: usize, id: &str, backend: &Arc<ScriptedBackend>) -> DbTask {
    let backend: Arc<dyn Backend> = backend.clone();
    DbTask::new(
        position,
        TargetRef::table("ks", "docs"),
        DbOperation::Insert(InsertRow::new(json!(id), json!({ "_id": id }))),
        backend,
        RetryPolicy::no_retry(),
    )
}

fn read_task(position: usize, marker: &str, backend: &Arc<ScriptedBackend>) -> DbTask {
    let backend: Arc<dyn Backend> = backend.clone();
    DbTask::new(
        position,
        TargetRef::table("ks", "docs"),
        DbOperation::read(
            Statement::new("SELECT * FROM ks.docs WHERE part = ?").with_values(vec![json!(marker)]),
        ),
        backend,
        RetryPolicy::no_retry(),
    )
}

async fn run<T, A>(group: TaskGroup<T>, accumulator: A) -> CommandResult
where
    T: Task,
    A: TaskAccumulator<T>,
{
    let mut operation = TaskOperation::new(group, accumulator);
    let result = operation.execute(&CommandContext::default()).await.unwrap();
    result.get().clone()
}

#[test]
fn test_empty_parts_are_omitted() {
    let result = CommandResultBuilder::new().build();
    assert_eq!(result.to_json(), json!({}));
    assert!(result.is_success());
    assert!(result.documents().is_empty());

    let with_docs = CommandResultBuilder::new().with_documents().build();
    assert_eq!(with_docs.to_json(), json!({ "data": { "documents": [] } }));
}

#[test]
fn test_errors_serialize_with_error_code() {
    let mut builder = CommandResultBuilder::new();
    builder.add_error(ApiError::new(ErrorCode::DocumentAlreadyExists, "dup"));
    let json = builder.build().to_json();

    let error = &json["errors"][0];
    assert_eq!(error["errorCode"], "DOCUMENT_ALREADY_EXISTS");
    assert_eq!(error["family"], "REQUEST");
    assert_eq!(error["message"], "dup");
    assert!(error["id"].is_string());
}

#[tokio::test]
async fn test_insert_page_reports_ids_and_document_responses() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on("\"b\"", Behavior::Fail(TaskFault::InvalidQuery("rejected".into()))),
    );
    let group = TaskGroup::with_tasks(
        vec![
            insert_task(0, "a", &backend),
            insert_task(1, "b", &backend),
            insert_task(2, "c", &backend),
        ],
        true,
    );

    let result = run(group, InsertAccumulator::new(true)).await;

    assert_eq!(result.status["insertedIds"], json!(["a"]));
    assert_eq!(
        result.status["documentResponses"],
        json!([
            { "_id": "a", "status": "OK" },
            { "_id": "b", "status": "ERROR", "errorsIdx": [0] },
            { "_id": "c", "status": "SKIPPED" },
        ])
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ErrorCode::InvalidQuery);
}

#[tokio::test]
async fn test_insert_page_without_document_responses() {
    let backend = Arc::new(ScriptedBackend::new());
    let group = TaskGroup::with_tasks(
        vec![insert_task(1, "y", &backend), insert_task(0, "x", &backend)],
        false,
    );

    let result = run(group, InsertAccumulator::new(false)).await;

    assert_eq!(result.status["insertedIds"], json!(["x", "y"]));
    assert!(!result.status.contains_key("documentResponses"));
    assert!(result.is_success());
}

#[tokio::test]
async fn test_read_page_merges_rows_in_position_order() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on(
                "\"p0\"",
                Behavior::Delayed(
                    std::time::Duration::from_millis(30),
                    Box::new(Behavior::Rows(vec![json!({ "_id": 1 }), json!({ "_id": 2 })])),
                ),
            )
            .on("\"p1\"", Behavior::Rows(vec![json!({ "_id": 3 })])),
    );
    let schema = json!({ "_id": "int" });
    let first = DbTask::new(
        0,
        TargetRef::table("ks", "docs"),
        DbOperation::Read {
            statement: Statement::new("SELECT * FROM ks.docs WHERE part = ?")
                .with_values(vec![json!("p0")]),
            projection_schema: Some(schema.clone()),
        },
        backend.clone(),
        RetryPolicy::no_retry(),
    );
    let group = TaskGroup::with_tasks(vec![first, read_task(1, "p1", &backend)], false);

    let result = run(group, ReadAccumulator::new()).await;

    assert_eq!(
        result.documents(),
        &[json!({ "_id": 1 }), json!({ "_id": 2 }), json!({ "_id": 3 })]
    );
    assert_eq!(result.status["projectionSchema"], schema);
}

#[tokio::test]
async fn test_read_page_lifts_warnings_and_skips_failed_rows() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on(
                "\"p0\"",
                Behavior::RowsWithWarning(vec![json!({ "_id": 1 })], "read 2000 tombstones".into()),
            )
            .on("\"p1\"", Behavior::Fail(TaskFault::Unavailable("no replicas".into()))),
    );
    let group = TaskGroup::with_tasks(
        vec![read_task(0, "p0", &backend), read_task(1, "p1", &backend)],
        false,
    );

    let result = run(group, ReadAccumulator::new()).await;

    assert_eq!(result.documents(), &[json!({ "_id": 1 })]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ErrorCode::DatabaseUnavailable);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, WarningCode::DatabaseWarning);
}

#[tokio::test]
async fn test_suppressed_warnings_are_left_out_of_page() {
    let backend = Arc::new(
        ScriptedBackend::new().on("SELECT", Behavior::RowsWithWarning(vec![], "slow".into())),
    );
    let task = read_task(0, "p0", &backend)
        .with_suppressed_warnings(vec![WarningCode::DatabaseWarning]);
    let group = TaskGroup::with_tasks(vec![task], false);

    let result = run(group, ReadAccumulator::new()).await;
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_schema_page_acknowledges_only_without_errors() {
    let backend = Arc::new(
        ScriptedBackend::new().on("idx_b", Behavior::Fail(TaskFault::InvalidQuery("bad".into()))),
    );
    let ddl = |position: usize, text: &str| {
        let backend: Arc<dyn Backend> = backend.clone();
        DbTask::new(
            position,
            TargetRef::Keyspace("ks".into()),
            DbOperation::Schema {
                statement: Statement::new(text),
                if_not_exists: false,
            },
            backend,
            RetryPolicy::no_retry(),
        )
    };

    let ok = run(
        TaskGroup::with_tasks(vec![ddl(0, "CREATE INDEX idx_a ON ks.docs (a)")], true),
        SchemaAccumulator::new(),
    )
    .await;
    assert_eq!(ok.status["ok"], json!(1));

    let failed = run(
        TaskGroup::with_tasks(vec![ddl(0, "CREATE INDEX idx_b ON ks.docs (b)")], true),
        SchemaAccumulator::new(),
    )
    .await;
    assert!(!failed.status.contains_key("ok"));
    assert_eq!(failed.errors.len(), 1);
}

#[test]
fn test_accumulated_tasks_ignore_duplicates() {
    let backend = Arc::new(ScriptedBackend::new());
    let task = Arc::new(insert_task(0, "a", &backend));

    let mut tasks = AccumulatedTasks::new();
    tasks.push(Arc::clone(&task));
    tasks.push(task);
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn test_intermediate_page_carries_only_errors_and_warnings() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .on("\"p0\"", Behavior::Rows(vec![json!({ "_id": 1 })]))
            .on("\"p1\"", Behavior::Fail(TaskFault::Overloaded("busy".into()))),
    );
    let group = TaskGroup::with_tasks(
        vec![read_task(0, "p0", &backend), read_task(1, "p1", &backend)],
        false,
    );

    let result = run(group, IntermediateAccumulator::new()).await;

    assert!(result.data.is_none());
    assert!(result.status.is_empty());
    assert_eq!(result.errors[0].code, ErrorCode::DatabaseOverloaded);
}
