use crate::backend::{Backend, EmbeddingProvider};
use crate::config::EngineConfig;
use crate::error::{ApiError, ErrorCode};
use crate::page::{CompositeAccumulator, InsertAccumulator, IntermediateAccumulator};
use crate::task::{RetryPolicy, RunnableOperation, TargetRef, Task, TaskGroup, TaskOperation};
use crate::tasks::{
    CompositeTask, DbOperation, DbTask, EmbeddingTarget, EmbeddingTask, InsertRow, vector_slot,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Field holding the text to vectorize for a document
pub const VECTORIZE_FIELD: &str = "$vectorize";

/// Builds insert operations, with an embedding stage when documents need vectors
pub struct InsertPipeline {
    table: String,
    keyspace: Option<String>,
    backend: Arc<dyn Backend>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    ordered: bool,
    document_responses: bool,
}

impl InsertPipeline {
    pub fn new(table: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            table: table.into(),
            keyspace: None,
            backend,
            provider: None,
            ordered: false,
            document_responses: false,
        }
    }

    pub fn keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    /// Insert one document at a time and stop at the first failure
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    /// Report a per-document outcome under `documentResponses`
    pub fn document_responses(mut self, enabled: bool) -> Self {
        self.document_responses = enabled;
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self, documents: Vec<Value>, config: &EngineConfig) -> Box<dyn RunnableOperation> {
        let keyspace = self
            .keyspace
            .clone()
            .unwrap_or_else(|| config.keyspace.clone());
        let target = TargetRef::table(keyspace, self.table.clone());
        let retry = RetryPolicy::for_write(&config.write, true);

        let mut inserts = TaskGroup::new(self.ordered);
        let mut embeddings = Vec::new();

        for (position, mut document) in documents.into_iter().enumerate() {
            let Some(fields) = document.as_object_mut() else {
                let task = DbTask::new(
                    position,
                    target.clone(),
                    DbOperation::Insert(InsertRow::new(Value::Null, document)),
                    Arc::clone(&self.backend),
                    retry.clone(),
                );
                task.maybe_add_failure(ApiError::new(
                    ErrorCode::InvalidDocument,
                    format!("Document at position {position} is not a JSON object"),
                ));
                inserts.add(task);
                continue;
            };

            let doc_id = fields
                .entry("_id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
                .clone();
            let text = fields
                .get(VECTORIZE_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string);

            let mut row = InsertRow::new(doc_id, document);
            if let (Some(text), Some(_)) = (text, &self.provider) {
                let slot = vector_slot();
                embeddings.push(EmbeddingTarget::new(text, Arc::clone(&slot)));
                row = row.with_vector(slot);
            }

            inserts.add(DbTask::new(
                position,
                target.clone(),
                DbOperation::Insert(row),
                Arc::clone(&self.backend),
                retry.clone(),
            ));
        }

        let insert_op = TaskOperation::new(inserts, InsertAccumulator::new(self.document_responses));

        let provider = match &self.provider {
            Some(provider) if !embeddings.is_empty() => Arc::clone(provider),
            _ => return Box::new(insert_op),
        };

        let batch_size = config.embedding.batch_size.max(1);
        let embedding_retry = RetryPolicy::from_config(&config.embedding.retry);
        let mut batches = TaskGroup::parallel();
        for (position, chunk) in embeddings.chunks(batch_size).enumerate() {
            batches.add(EmbeddingTask::new(
                position,
                Arc::clone(&provider),
                chunk.to_vec(),
                config.embedding.max_input_chars,
                embedding_retry.clone(),
            ));
        }
        debug!(
            texts = embeddings.len(),
            batches = batches.len(),
            "Insert needs an embedding stage"
        );

        let vectorize = TaskOperation::new(batches, IntermediateAccumulator::new());
        let mut stages = TaskGroup::sequential();
        stages.add(CompositeTask::intermediate(0, "vectorize", Box::new(vectorize)));
        stages.add(CompositeTask::last_stage(1, "insert", Box::new(insert_op)));
        Box::new(TaskOperation::new(stages, CompositeAccumulator::new()))
    }
}
