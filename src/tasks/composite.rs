use crate::context::CommandContext;
use crate::error::{ApiError, TaskFault};
use crate::page::CommandResult;
use crate::task::{
    Deferred, ResultSupplier, RetryPolicy, RunnableOperation, TargetRef, Task, TaskState,
};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::debug;

/// Role of a stage in a multi-stage pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Prepares data for later stages; its result is never shown on success
    Intermediate,
    /// Produces the response of the whole pipeline
    Last,
}

/// What running the inner operation produced
pub struct InnerOutcome {
    pub result: Deferred<CommandResult>,
    pub first_failure: Option<ApiError>,
}

/// A task whose work is an entire inner operation.
///
/// Lets a pipeline run stages of different task kinds in sequence: an outer
/// sequential group of composites fails fast as soon as one stage has a failed
/// inner task. Composites never retry since the inner operation runs only once.
pub struct CompositeTask {
    state: TaskState,
    kind: StageKind,
    name: String,
    operation: Mutex<Option<Box<dyn RunnableOperation>>>,
    result: OnceLock<Deferred<CommandResult>>,
}

impl CompositeTask {
    pub fn new(
        position: usize,
        name: impl Into<String>,
        kind: StageKind,
        operation: Box<dyn RunnableOperation>,
    ) -> Self {
        let name = name.into();
        let state = TaskState::new(
            position,
            TargetRef::Stage(name.clone()),
            RetryPolicy::no_retry(),
        );
        state.mark_ready();
        Self {
            state,
            kind,
            name,
            operation: Mutex::new(Some(operation)),
            result: OnceLock::new(),
        }
    }

    pub fn intermediate(
        position: usize,
        name: impl Into<String>,
        operation: Box<dyn RunnableOperation>,
    ) -> Self {
        Self::new(position, name, StageKind::Intermediate, operation)
    }

    pub fn last_stage(
        position: usize,
        name: impl Into<String>,
        operation: Box<dyn RunnableOperation>,
    ) -> Self {
        Self::new(position, name, StageKind::Last, operation)
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deferred response of the inner operation, once it has run
    pub fn stage_result(&self) -> Option<&Deferred<CommandResult>> {
        self.result.get()
    }
}

impl Task for CompositeTask {
    type Output = InnerOutcome;

    fn state(&self) -> &TaskState {
        &self.state
    }

    fn build_result_supplier(&self, ctx: &CommandContext) -> ResultSupplier<InnerOutcome> {
        let taken = self
            .operation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut operation) = taken else {
            return ResultSupplier::failing(
                format!("stage {}", self.name),
                TaskFault::Internal(format!("inner operation of stage {} already ran", self.name)),
            );
        };

        let ctx = ctx.clone();
        let description = format!("stage {}: {}", self.name, operation.describe());
        ResultSupplier::new(description, move || async move {
            let result = operation
                .run(&ctx)
                .await
                .map_err(|e| TaskFault::Internal(e.to_string()))?;
            Ok(InnerOutcome {
                result,
                first_failure: operation.first_failure(),
            })
        })
    }

    fn on_success(&self, outcome: InnerOutcome) {
        let _ = self.result.set(outcome.result);
        if let Some(failure) = outcome.first_failure {
            debug!(stage = %self.name, error = %failure, "Stage has a failed inner task");
            self.maybe_add_failure(failure);
        }
    }
}
