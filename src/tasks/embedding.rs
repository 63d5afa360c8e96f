use crate::backend::EmbeddingProvider;
use crate::context::CommandContext;
use crate::error::TaskFault;
use crate::task::{ResultSupplier, RetryPolicy, TargetRef, Task, TaskState, Warning, WarningCode};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Write-once cell an embedding task fills and an insert task reads
pub type VectorSlot = Arc<OnceLock<Vec<f32>>>;

pub fn vector_slot() -> VectorSlot {
    Arc::new(OnceLock::new())
}

/// One text to vectorize and where its vector goes
#[derive(Debug, Clone)]
pub struct EmbeddingTarget {
    pub text: String,
    pub slot: VectorSlot,
}

impl EmbeddingTarget {
    pub fn new(text: impl Into<String>, slot: VectorSlot) -> Self {
        Self {
            text: text.into(),
            slot,
        }
    }
}

/// Vectorizes one batch of texts through an embedding provider
pub struct EmbeddingTask {
    state: TaskState,
    provider: Arc<dyn EmbeddingProvider>,
    targets: Vec<EmbeddingTarget>,
}

impl EmbeddingTask {
    /// Texts longer than `max_input_chars` are cut and a warning is recorded
    pub fn new(
        position: usize,
        provider: Arc<dyn EmbeddingProvider>,
        mut targets: Vec<EmbeddingTarget>,
        max_input_chars: usize,
        retry_policy: RetryPolicy,
    ) -> Self {
        let target = TargetRef::EmbeddingProvider(provider.provider_name().to_string());
        let state = TaskState::new(position, target, retry_policy);

        for target in &mut targets {
            let chars = target.text.chars().count();
            if chars > max_input_chars {
                target.text = target.text.chars().take(max_input_chars).collect();
                state.add_warning(Warning::new(
                    WarningCode::EmbeddingInputTruncated,
                    format!("Embedding input of {chars} characters truncated to {max_input_chars}"),
                ));
            }
        }

        state.mark_ready();
        Self {
            state,
            provider,
            targets,
        }
    }

    pub fn targets(&self) -> &[EmbeddingTarget] {
        &self.targets
    }
}

impl Task for EmbeddingTask {
    type Output = Vec<Vec<f32>>;

    fn state(&self) -> &TaskState {
        &self.state
    }

    fn build_result_supplier(&self, _ctx: &CommandContext) -> ResultSupplier<Self::Output> {
        let texts: Vec<String> = self.targets.iter().map(|t| t.text.clone()).collect();
        let expected = texts.len();
        let provider = Arc::clone(&self.provider);
        let dimension = provider.dimension();
        let description = format!(
            "vectorize {} text(s) with provider {}",
            expected,
            provider.provider_name()
        );

        ResultSupplier::new(description, move || async move {
            let vectors = provider.vectorize(texts).await?;
            if vectors.len() != expected {
                return Err(TaskFault::Provider {
                    status: 200,
                    message: format!(
                        "returned {} vector(s) for {} input(s)",
                        vectors.len(),
                        expected
                    ),
                });
            }
            if let Some(vector) = vectors.iter().find(|v| v.len() != dimension) {
                return Err(TaskFault::Provider {
                    status: 200,
                    message: format!(
                        "returned a vector of dimension {}, expected {}",
                        vector.len(),
                        dimension
                    ),
                });
            }
            Ok(vectors)
        })
    }

    fn on_success(&self, vectors: Vec<Vec<f32>>) {
        for (target, vector) in self.targets.iter().zip(vectors) {
            if target.slot.set(vector).is_err() {
                debug!(position = self.position(), "Vector slot already filled");
            }
        }
    }
}
