use super::*;
use crate::backend::{Backend, Behavior, EmbeddingProvider, MockEmbeddingProvider, ScriptedBackend, Statement};
use crate::config::RetryConfig;
use crate::context::CommandContext;
use crate::error::{ErrorCode, TaskFault};
use crate::page::{CompositeAccumulator, InsertAccumulator, IntermediateAccumulator};
use crate::task::{
    RetryPolicy, RunnableOperation, TargetRef, Task, TaskGroup, TaskOperation, TaskStatus,
    WarningCode,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn ctx() -> CommandContext {
    CommandContext::default()
}

fn insert(position: usize, id: &str, backend: Arc<dyn Backend>, policy: RetryPolicy) -> DbTask {
    DbTask::new(
        position,
        TargetRef::table("ks", "docs"),
        DbOperation::Insert(InsertRow::new(json!(id), json!({ "_id": id, "n": position }))),
        backend,
        policy,
    )
}

/// Provider that always answers with a single two-element vector
struct ShortProvider {
    dimension: usize,
}

impl EmbeddingProvider for ShortProvider {
    fn vectorize(&self, _texts: Vec<String>) -> BoxFuture<'_, Result<Vec<Vec<f32>>, TaskFault>> {
        async { Ok(vec![vec![0.5, 0.5]]) }.boxed()
    }

    fn provider_name(&self) -> &str {
        "short"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[tokio::test]
async fn test_insert_not_applied_is_document_already_exists() {
    let backend = Arc::new(ScriptedBackend::new().on("\"dup\"", Behavior::NotApplied));
    let task = insert(0, "dup", backend, RetryPolicy::no_retry());
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.status(), TaskStatus::Error);
    let failure = task.failure().unwrap();
    assert_eq!(failure.code, ErrorCode::DocumentAlreadyExists);
    assert!(failure.message.contains("dup"));
}

#[tokio::test]
async fn test_insert_retries_write_timeout() {
    let backend = Arc::new(ScriptedBackend::new().on(
        "INSERT",
        Behavior::FailTimes {
            times: 2,
            fault: TaskFault::WriteTimeout("coordinator timeout".into()),
            then: vec![],
        },
    ));
    let policy = RetryPolicy::for_write(&RetryConfig::new(3, 1), true);
    let task = insert(0, "a", backend.clone(), policy);
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(backend.calls_matching("INSERT"), 3);
    assert_eq!(task.state().attempts(), 3);
}

#[tokio::test]
async fn test_non_idempotent_modify_is_not_retried() {
    let backend = Arc::new(ScriptedBackend::new().on(
        "UPDATE",
        Behavior::Fail(TaskFault::WriteTimeout("coordinator timeout".into())),
    ));
    let statement = Statement::new("UPDATE ks.docs SET n = n + 1 WHERE key = ?").idempotent(false);
    let policy = RetryPolicy::for_write(&RetryConfig::new(3, 1), statement.idempotent);
    let task = DbTask::new(
        0,
        TargetRef::table("ks", "docs"),
        DbOperation::Modify(statement),
        backend.clone(),
        policy,
    );
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(backend.total_calls(), 1);
    assert_eq!(task.failure().unwrap().code, ErrorCode::DatabaseWriteTimeout);
}

#[tokio::test]
async fn test_schema_if_not_exists_swallows_existing_object() {
    let backend = Arc::new(ScriptedBackend::new().on(
        "CREATE TABLE",
        Behavior::Fail(TaskFault::AlreadyExists("table ks.docs".into())),
    ));
    let task = DbTask::new(
        0,
        TargetRef::Keyspace("ks".into()),
        DbOperation::Schema {
            statement: Statement::new("CREATE TABLE ks.docs (key text PRIMARY KEY)"),
            if_not_exists: true,
        },
        backend,
        RetryPolicy::no_retry(),
    );
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(task.failure().is_none());
    assert!(task.result().is_none());
    let warnings = task.state().visible_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, WarningCode::SchemaObjectExists);
}

#[tokio::test]
async fn test_schema_without_if_not_exists_fails() {
    let backend = Arc::new(ScriptedBackend::new().on(
        "CREATE TABLE",
        Behavior::Fail(TaskFault::AlreadyExists("table ks.docs".into())),
    ));
    let task = DbTask::new(
        0,
        TargetRef::Keyspace("ks".into()),
        DbOperation::Schema {
            statement: Statement::new("CREATE TABLE ks.docs (key text PRIMARY KEY)"),
            if_not_exists: false,
        },
        backend,
        RetryPolicy::no_retry(),
    );
    let task = Arc::new(task).execute(&ctx()).await;

    let failure = task.failure().unwrap();
    assert_eq!(failure.code, ErrorCode::AlreadyExists);
    assert!(failure.message.contains("CREATE TABLE ks.docs"));
}

#[tokio::test]
async fn test_insert_reads_vector_at_attempt_time() {
    let backend = Arc::new(ScriptedBackend::new());
    let slot = vector_slot();
    let row = InsertRow::new(json!("v1"), json!({ "_id": "v1" })).with_vector(Arc::clone(&slot));
    let task = DbTask::new(
        0,
        TargetRef::table("ks", "docs"),
        DbOperation::Insert(row),
        backend.clone(),
        RetryPolicy::no_retry(),
    );

    // Filled after the task was built, as an earlier stage would
    slot.set(vec![0.25, 0.75]).unwrap();
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.status(), TaskStatus::Completed);
    let executed = backend.executed();
    assert!(executed[0].text.contains("query_vector"));
    assert_eq!(executed[0].values[2], json!([0.25, 0.75]));
}

#[tokio::test]
async fn test_insert_without_generated_vector_fails() {
    let backend = Arc::new(ScriptedBackend::new());
    let row = InsertRow::new(json!("v1"), json!({ "_id": "v1" })).with_vector(vector_slot());
    let task = DbTask::new(
        0,
        TargetRef::table("ks", "docs"),
        DbOperation::Insert(row),
        backend.clone(),
        RetryPolicy::transient(3, Duration::from_millis(1)),
    );
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.failure().unwrap().code, ErrorCode::EmbeddingVectorMissing);
    assert_eq!(task.state().attempts(), 1);
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_embedding_task_fills_slots() {
    let provider = Arc::new(MockEmbeddingProvider::new(4));
    let slots = [vector_slot(), vector_slot()];
    let targets = vec![
        EmbeddingTarget::new("first", Arc::clone(&slots[0])),
        EmbeddingTarget::new("second", Arc::clone(&slots[1])),
    ];
    let task = EmbeddingTask::new(0, provider.clone(), targets, 100, RetryPolicy::no_retry());
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(slots[0].get(), Some(&provider.embed("first")));
    assert_eq!(slots[1].get(), Some(&provider.embed("second")));
}

#[test]
fn test_embedding_input_is_truncated_with_warning() {
    let provider = Arc::new(MockEmbeddingProvider::new(4));
    let targets = vec![
        EmbeddingTarget::new("x".repeat(20), vector_slot()),
        EmbeddingTarget::new("short", vector_slot()),
    ];
    let task = EmbeddingTask::new(0, provider, targets, 8, RetryPolicy::no_retry());

    assert_eq!(task.targets()[0].text, "x".repeat(8));
    assert_eq!(task.targets()[1].text, "short");
    let warnings = task.state().visible_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, WarningCode::EmbeddingInputTruncated);
    assert_eq!(task.status(), TaskStatus::Ready);
}

#[tokio::test]
async fn test_embedding_provider_errors_are_retried() {
    let provider = Arc::new(MockEmbeddingProvider::new(4).failing_first(
        2,
        TaskFault::Provider {
            status: 503,
            message: "busy".into(),
        },
    ));
    let slot = vector_slot();
    let task = EmbeddingTask::new(
        0,
        provider.clone(),
        vec![EmbeddingTarget::new("text", Arc::clone(&slot))],
        100,
        RetryPolicy::transient(3, Duration::from_millis(1)),
    );
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(provider.calls(), 3);
    assert!(slot.get().is_some());
}

#[tokio::test]
async fn test_embedding_vector_count_mismatch_fails() {
    let targets = vec![
        EmbeddingTarget::new("a", vector_slot()),
        EmbeddingTarget::new("b", vector_slot()),
    ];
    let task = EmbeddingTask::new(
        0,
        Arc::new(ShortProvider { dimension: 2 }),
        targets,
        100,
        RetryPolicy::transient(3, Duration::from_millis(1)),
    );
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.state().attempts(), 1);
    let failure = task.failure().unwrap();
    assert_eq!(failure.code, ErrorCode::EmbeddingProviderError);
    assert!(failure.message.contains("1 vector(s) for 2 input(s)"));
    assert!(task.targets().iter().all(|t| t.slot.get().is_none()));
}

#[tokio::test]
async fn test_embedding_vector_dimension_mismatch_fails() {
    let slot = vector_slot();
    let task = EmbeddingTask::new(
        0,
        Arc::new(ShortProvider { dimension: 3 }),
        vec![EmbeddingTarget::new("a", Arc::clone(&slot))],
        100,
        RetryPolicy::transient(3, Duration::from_millis(1)),
    );
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.state().attempts(), 1);
    let failure = task.failure().unwrap();
    assert_eq!(failure.code, ErrorCode::EmbeddingProviderError);
    assert!(failure.message.contains("dimension 2, expected 3"));
    assert!(slot.get().is_none());
}

fn insert_stage(backend: Arc<ScriptedBackend>, ids: &[&str]) -> Box<dyn RunnableOperation> {
    let tasks = ids
        .iter()
        .enumerate()
        .map(|(position, id)| insert(position, id, backend.clone(), RetryPolicy::no_retry()))
        .collect();
    Box::new(TaskOperation::new(
        TaskGroup::with_tasks(tasks, false),
        InsertAccumulator::new(false),
    ))
}

#[tokio::test]
async fn test_composite_records_first_inner_failure() {
    let backend = Arc::new(ScriptedBackend::new().on(
        "\"b\"",
        Behavior::Fail(TaskFault::InvalidQuery("rejected".into())),
    ));
    let task = CompositeTask::last_stage(0, "insert", insert_stage(backend, &["a", "b", "c"]));
    let task = Arc::new(task).execute(&ctx()).await;

    assert_eq!(task.status(), TaskStatus::Error);
    assert_eq!(task.failure().unwrap().code, ErrorCode::InvalidQuery);
    let inner = task.stage_result().unwrap().get();
    assert_eq!(inner.status["insertedIds"], json!(["a", "c"]));
    assert_eq!(inner.errors[0], *task.failure().unwrap());
}

#[tokio::test]
async fn test_composite_inner_operation_runs_once() {
    let backend = Arc::new(ScriptedBackend::new());
    let task = Arc::new(CompositeTask::intermediate(
        0,
        "insert",
        insert_stage(backend.clone(), &["a"]),
    ));
    let ctx = ctx();

    let task = task.execute(&ctx).await;
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.kind(), StageKind::Intermediate);
    assert_eq!(task.name(), "insert");

    let task = task.execute(&ctx).await;
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(backend.total_calls(), 1);
}

fn embedding_stage(
    provider: Arc<MockEmbeddingProvider>,
    targets: Vec<EmbeddingTarget>,
) -> Box<dyn RunnableOperation> {
    let task = EmbeddingTask::new(0, provider, targets, 3, RetryPolicy::no_retry());
    Box::new(TaskOperation::new(
        TaskGroup::with_tasks(vec![task], false),
        IntermediateAccumulator::new(),
    ))
}

async fn run_stages(stages: Vec<CompositeTask>) -> crate::page::CommandResult {
    let mut operation = TaskOperation::new(
        TaskGroup::with_tasks(stages, true),
        CompositeAccumulator::new(),
    );
    operation.execute(&ctx()).await.unwrap().get().clone()
}

#[tokio::test]
async fn test_composite_pipeline_returns_last_stage_with_earlier_warnings() {
    let provider = Arc::new(MockEmbeddingProvider::new(2));
    let backend = Arc::new(ScriptedBackend::new());
    let slot = vector_slot();
    let targets = vec![EmbeddingTarget::new("long text", Arc::clone(&slot))];

    let row = InsertRow::new(json!("a"), json!({ "_id": "a" })).with_vector(slot);
    let inserts = TaskOperation::new(
        TaskGroup::with_tasks(
            vec![DbTask::new(
                0,
                TargetRef::table("ks", "docs"),
                DbOperation::Insert(row),
                backend.clone(),
                RetryPolicy::no_retry(),
            )],
            true,
        ),
        InsertAccumulator::new(false),
    );

    let result = run_stages(vec![
        CompositeTask::intermediate(0, "vectorize", embedding_stage(provider, targets)),
        CompositeTask::last_stage(1, "insert", Box::new(inserts)),
    ])
    .await;

    assert_eq!(result.status["insertedIds"], json!(["a"]));
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, WarningCode::EmbeddingInputTruncated);
    assert!(result.errors.is_empty());
    assert!(backend.executed()[0].values[2].is_array());
}

#[tokio::test]
async fn test_composite_pipeline_surfaces_failed_stage() {
    let provider = Arc::new(MockEmbeddingProvider::new(2).failing_on(
        "bad",
        TaskFault::Provider {
            status: 400,
            message: "unsupported input".into(),
        },
    ));
    let backend = Arc::new(ScriptedBackend::new());
    let targets = vec![EmbeddingTarget::new("bad", vector_slot())];

    let result = run_stages(vec![
        CompositeTask::intermediate(0, "vectorize", embedding_stage(provider, targets)),
        CompositeTask::last_stage(1, "insert", insert_stage(backend.clone(), &["a"])),
    ])
    .await;

    assert_eq!(backend.total_calls(), 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ErrorCode::EmbeddingProviderError);
    assert!(result.status.is_empty());
    assert_eq!(result.to_json().get("data"), None::<&Value>);
}

#[tokio::test]
async fn test_composite_pipeline_answers_with_stage_marked_last() {
    let provider = Arc::new(MockEmbeddingProvider::new(2));
    let backend = Arc::new(ScriptedBackend::new());
    let targets = vec![EmbeddingTarget::new("long text", vector_slot())];

    // The payload stage runs first; the trailing stage only prepares data
    let result = run_stages(vec![
        CompositeTask::last_stage(0, "insert", insert_stage(backend.clone(), &["a"])),
        CompositeTask::intermediate(1, "vectorize", embedding_stage(provider, targets)),
    ])
    .await;

    assert_eq!(result.status["insertedIds"], json!(["a"]));
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, WarningCode::EmbeddingInputTruncated);
    assert_eq!(backend.total_calls(), 1);
}
