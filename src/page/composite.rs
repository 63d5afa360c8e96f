use crate::page::{AccumulatedTasks, CommandResult, ResultPage};
use crate::task::{Deferred, Task, TaskAccumulator, TaskStatus, Warning};
use crate::tasks::{CompositeTask, StageKind};
use std::sync::Arc;
use tracing::error;

/// Response of a multi-stage pipeline.
///
/// When the stage marked [`StageKind::Last`] completed, its own response is
/// returned with the warnings of the other stages in front. Otherwise the response of the first
/// failed stage is returned so its inner errors reach the caller.
#[derive(Default)]
pub struct CompositeAccumulator {
    tasks: AccumulatedTasks<CompositeTask>,
}

impl CompositeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskAccumulator<CompositeTask> for CompositeAccumulator {
    fn accumulate(&mut self, task: Arc<CompositeTask>) {
        self.tasks.push(task);
    }

    fn get_results(&self) -> Deferred<CommandResult> {
        let page = self.tasks.page();
        Deferred::new(move || composite_result(&page))
    }
}

fn composite_result(page: &ResultPage<CompositeTask>) -> CommandResult {
    let stages = page.tasks();

    if let Some(index) = last_stage_index(stages)
        && stages[index].status() == TaskStatus::Completed
        && let Some(result) = stages[index].stage_result()
    {
        let others = stages
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, stage)| stage);
        return with_leading_warnings(result.get().clone(), others);
    }

    if let Some(index) = stages
        .iter()
        .position(|stage| stage.status() == TaskStatus::Error)
        && let Some(result) = stages[index].stage_result()
    {
        return with_leading_warnings(result.get().clone(), &stages[..index]);
    }

    // A stage failed before its inner operation produced anything
    page.builder().build()
}

/// Index of the stage marked last, falling back to the final stage by position
fn last_stage_index(stages: &[Arc<CompositeTask>]) -> Option<usize> {
    let marked = stages
        .iter()
        .rposition(|stage| stage.kind() == StageKind::Last);
    match marked {
        Some(index) if index + 1 != stages.len() => {
            error!(
                stage = stages[index].name(),
                position = stages[index].position(),
                stages = stages.len(),
                "Last stage is not the final stage of the pipeline"
            );
        }
        None if !stages.is_empty() => {
            error!(stages = stages.len(), "Pipeline has no stage marked last");
        }
        _ => {}
    }
    marked.or_else(|| stages.len().checked_sub(1))
}

fn with_leading_warnings<'a>(
    mut result: CommandResult,
    others: impl IntoIterator<Item = &'a Arc<CompositeTask>>,
) -> CommandResult {
    let mut warnings: Vec<Warning> = Vec::new();
    for stage in others {
        warnings.extend(stage.state().visible_warnings());
        if let Some(stage_result) = stage.stage_result() {
            warnings.extend(stage_result.get().warnings.iter().cloned());
        }
    }
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    result
}
