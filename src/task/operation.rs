use crate::context::CommandContext;
use crate::error::{ApiError, EngineError};
use crate::page::CommandResult;
use crate::task::base::Task;
use crate::task::group::TaskGroup;
use crate::task::supplier::Deferred;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};

/// Collects terminal tasks and builds the response from them.
///
/// Every task of a run is accumulated exactly once, in completion order.
/// [`get_results`](TaskAccumulator::get_results) is only called after all of
/// them are terminal and must not build anything until the returned value is read.
pub trait TaskAccumulator<T: Task>: Send + 'static {
    fn accumulate(&mut self, task: Arc<T>);

    fn get_results(&self) -> Deferred<CommandResult>;
}

/// A runnable pipeline with its task kind erased.
///
/// Lets request builders hand back a single type, and lets composite tasks
/// nest operations whose tasks differ.
#[async_trait]
pub trait RunnableOperation: Send {
    async fn run(&mut self, ctx: &CommandContext) -> Result<Deferred<CommandResult>, EngineError>;

    /// Failure of the lowest-positioned failed task, once run
    fn first_failure(&self) -> Option<ApiError>;

    fn describe(&self) -> String;
}

/// Drives one task group through execution into an accumulator.
pub struct TaskOperation<T: Task, A: TaskAccumulator<T>> {
    group: TaskGroup<T>,
    accumulator: A,
    ran: bool,
}

impl<T: Task, A: TaskAccumulator<T>> TaskOperation<T, A> {
    pub fn new(group: TaskGroup<T>, accumulator: A) -> Self {
        Self {
            group,
            accumulator,
            ran: false,
        }
    }

    pub fn group(&self) -> &TaskGroup<T> {
        &self.group
    }

    pub fn accumulator(&self) -> &A {
        &self.accumulator
    }

    /// Run every task to a terminal status and return the deferred response.
    ///
    /// Task faults never surface here; only engine invariant failures do.
    pub async fn execute(
        &mut self,
        ctx: &CommandContext,
    ) -> Result<Deferred<CommandResult>, EngineError> {
        if self.ran {
            return Err(EngineError::OperationAlreadyRun);
        }
        self.ran = true;
        self.group.sort_by_position();

        let span = info_span!(
            "command",
            command = %ctx.command,
            request_id = %ctx.request_id,
            tenant = ctx.tenant.as_deref().unwrap_or("-"),
            tasks = self.group.len(),
            sequential = self.group.is_sequential(),
        );

        self.run_group(ctx).instrument(span).await
    }

    async fn run_group(
        &mut self,
        ctx: &CommandContext,
    ) -> Result<Deferred<CommandResult>, EngineError> {
        if self.group.is_sequential() {
            self.run_sequential(ctx).await;
        } else {
            self.run_parallel(ctx).await;
        }

        self.group.throw_if_not_all_terminal()?;

        info!(
            completed = self.group.completed_tasks().len(),
            failed = self.group.error_tasks().len(),
            skipped = self.group.skipped_tasks().len(),
            "Task group finished"
        );
        Ok(self.accumulator.get_results())
    }

    async fn run_sequential(&mut self, ctx: &CommandContext) {
        let tasks = self.group.tasks().to_vec();
        for task in tasks {
            let task = if self.group.should_fail_fast(&task) {
                if task.set_skipped_if_ready() {
                    debug!(position = task.position(), "Skipping task after earlier failure");
                }
                task
            } else {
                task.execute(ctx).await
            };
            self.accumulator.accumulate(task);
        }
    }

    async fn run_parallel(&mut self, ctx: &CommandContext) {
        let mut pending: FuturesUnordered<_> = self
            .group
            .iter()
            .map(|task| Arc::clone(task).execute(ctx))
            .collect();

        while let Some(task) = pending.next().await {
            self.accumulator.accumulate(task);
        }
    }
}

#[async_trait]
impl<T: Task, A: TaskAccumulator<T>> RunnableOperation for TaskOperation<T, A> {
    async fn run(&mut self, ctx: &CommandContext) -> Result<Deferred<CommandResult>, EngineError> {
        self.execute(ctx).await
    }

    fn first_failure(&self) -> Option<ApiError> {
        self.group
            .error_tasks()
            .iter()
            .min_by_key(|task| task.position())
            .and_then(|task| task.failure().cloned())
    }

    fn describe(&self) -> String {
        format!(
            "{} group of {} {}",
            if self.group.is_sequential() {
                "sequential"
            } else {
                "parallel"
            },
            self.group.len(),
            std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or("task")
        )
    }
}
