use crate::error::EngineError;
use crate::task::base::Task;
use crate::task::types::TaskStatus;
use std::sync::Arc;

/// Ordered collection of tasks of one kind, run either one at a time or all at once.
#[derive(Debug)]
pub struct TaskGroup<T> {
    tasks: Vec<Arc<T>>,
    sequential: bool,
}

impl<T: Task> TaskGroup<T> {
    pub fn new(sequential: bool) -> Self {
        Self {
            tasks: Vec::new(),
            sequential,
        }
    }

    pub fn sequential() -> Self {
        Self::new(true)
    }

    pub fn parallel() -> Self {
        Self::new(false)
    }

    pub fn with_tasks(tasks: Vec<T>, sequential: bool) -> Self {
        Self {
            tasks: tasks.into_iter().map(Arc::new).collect(),
            sequential,
        }
    }

    /// Add a task and get back the shared handle the group keeps
    pub fn add(&mut self, task: T) -> Arc<T> {
        let task = Arc::new(task);
        self.tasks.push(Arc::clone(&task));
        task
    }

    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Arc<T>] {
        &self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.tasks.iter()
    }

    pub(crate) fn sort_by_position(&mut self) {
        self.tasks.sort_by_key(|task| task.position());
    }

    /// Whether `target` must be skipped instead of executed.
    ///
    /// Parallel groups never fail fast. Sequential groups do when the target
    /// itself already failed or any task ahead of it in the group did.
    pub fn should_fail_fast(&self, target: &T) -> bool {
        if !self.sequential {
            return false;
        }
        if target.status() == TaskStatus::Error {
            return true;
        }
        for task in &self.tasks {
            if task.task_id() == target.task_id() {
                return false;
            }
            if task.status() == TaskStatus::Error {
                return true;
            }
        }
        false
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Arc<T>> {
        self.tasks
            .iter()
            .filter(|task| task.status() == status)
            .cloned()
            .collect()
    }

    pub fn error_tasks(&self) -> Vec<Arc<T>> {
        self.tasks_with_status(TaskStatus::Error)
    }

    pub fn completed_tasks(&self) -> Vec<Arc<T>> {
        self.tasks_with_status(TaskStatus::Completed)
    }

    pub fn skipped_tasks(&self) -> Vec<Arc<T>> {
        self.tasks_with_status(TaskStatus::Skipped)
    }

    /// Post-run sanity check; failing it means the engine itself is broken
    pub fn throw_if_not_all_terminal(&self) -> Result<(), EngineError> {
        let positions: Vec<usize> = self
            .tasks
            .iter()
            .filter(|task| !task.status().is_terminal())
            .map(|task| task.position())
            .collect();

        if positions.is_empty() {
            Ok(())
        } else {
            Err(EngineError::NotAllTerminal { positions })
        }
    }
}
