//! The `Task` trait and the attempt loop every task kind shares.
//!
//! A concrete task supplies three things: how to build a result supplier for
//! one attempt, how to translate a raw fault into an [`ApiError`], and what to
//! keep from a successful result. Status tracking, retries and completion
//! handling live here.

use crate::context::CommandContext;
use crate::error::{ApiError, TaskFault};
use crate::task::state::TaskState;
use crate::task::supplier::{AttemptContext, ResultSupplier};
use crate::task::types::{TaskId, TaskStatus, Warning};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info_span, warn};

pub trait Task: Send + Sync + 'static {
    /// What one successful attempt produces
    type Output: Send + 'static;

    fn state(&self) -> &TaskState;

    /// Build the supplier for one attempt. Called once per attempt; must not start I/O.
    fn build_result_supplier(&self, ctx: &CommandContext) -> ResultSupplier<Self::Output>;

    /// Translate the last attempt's fault into a domain error.
    ///
    /// Only called when the final attempt failed; a successful result goes to
    /// [`on_success`](Task::on_success) instead. Returning `None` swallows the
    /// fault: the task completes without a failure.
    fn map_fault(&self, attempt: &AttemptContext, fault: TaskFault) -> Option<ApiError> {
        Some(ApiError::from_fault(fault, &attempt.description))
    }

    /// Keep whatever the task needs from a successful attempt
    fn on_success(&self, result: Self::Output);

    fn task_id(&self) -> TaskId {
        self.state().id()
    }

    fn position(&self) -> usize {
        self.state().position()
    }

    fn status(&self) -> TaskStatus {
        self.state().status()
    }

    fn set_skipped_if_ready(&self) -> bool {
        self.state().set_skipped_if_ready()
    }

    fn maybe_add_failure(&self, error: ApiError) -> bool {
        self.state().maybe_add_failure(error)
    }

    fn failure(&self) -> Option<&ApiError> {
        self.state().failure()
    }

    fn add_warning(&self, warning: Warning) {
        self.state().add_warning(warning)
    }

    /// Run the task to a terminal status and hand it back.
    ///
    /// Never fails: faults end up recorded on the task.
    fn execute<'a>(self: Arc<Self>, ctx: &'a CommandContext) -> BoxFuture<'a, Arc<Self>>
    where
        Self: Sized,
    {
        execute_task(self, ctx).boxed()
    }
}

async fn execute_task<T: Task>(task: Arc<T>, ctx: &CommandContext) -> Arc<T> {
    let span = info_span!(
        "task",
        task_id = %task.task_id(),
        position = task.position(),
        target = %task.state().target(),
        request_id = %ctx.request_id,
    );
    run_to_completion(task.as_ref(), ctx).instrument(span).await;
    task
}

async fn run_to_completion<T: Task>(task: &T, ctx: &CommandContext) {
    let state = task.state();

    if let Err(actual) = state.begin() {
        if actual == TaskStatus::Error {
            // A failure was attached before execution, e.g. upstream validation
            debug!("Task already failed before execution, not running it");
        } else {
            error!(status = %actual, "Task executed while not READY");
            task.maybe_add_failure(ApiError::invalid_state(
                "execute",
                TaskStatus::Ready.as_str(),
                actual.as_str(),
            ));
        }
        return;
    }

    let policy = state.retry_policy().clone();
    debug!(max_retries = policy.max_retries(), "Starting task");

    let (outcome, attempted) = loop {
        let attempt = state.record_attempt();
        let supplier = task.build_result_supplier(ctx);
        let (attempted, future) = supplier.invoke(attempt);

        match future.await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempts = attempt, "Task succeeded after retry");
                }
                break (Ok(result), attempted);
            }
            Err(fault) => {
                if attempt < policy.max_retries() && policy.should_retry(&fault) {
                    warn!(
                        error = %fault,
                        attempt,
                        max_retries = policy.max_retries(),
                        delay_ms = policy.delay().as_millis() as u64,
                        "Task attempt failed, retrying"
                    );
                    tokio::time::sleep(policy.delay()).await;
                    continue;
                }
                break (Err(fault), attempted);
            }
        }
    };

    on_completion(task, outcome, &attempted);
}

fn on_completion<T: Task>(
    task: &T,
    outcome: Result<T::Output, TaskFault>,
    attempted: &AttemptContext,
) {
    let state = task.state();

    match outcome {
        Ok(result) => {
            task.on_success(result);
            if state.finish(TaskStatus::Completed) {
                debug!(attempts = attempted.attempt, "Task completed");
            } else {
                // on_success may legitimately record a failure (composite tasks do)
                debug!(status = %state.status(), "Task ended while handling its result");
            }
        }
        Err(fault) => {
            let raw = fault.to_string();
            match task.map_fault(attempted, fault) {
                Some(error) => {
                    debug!(
                        attempts = attempted.attempt,
                        error = %error,
                        "Task failed"
                    );
                    task.maybe_add_failure(error);
                }
                None => {
                    warn!(
                        fault = %raw,
                        attempted = %attempted.description,
                        "Task fault was swallowed by its error mapping"
                    );
                }
            }
            if state.finish(TaskStatus::Completed) {
                debug!("Task completed without a result");
            }
        }
    }
}
