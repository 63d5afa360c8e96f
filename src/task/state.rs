use crate::error::ApiError;
use crate::task::retry::RetryPolicy;
use crate::task::types::*;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Lifecycle state shared by every task kind.
///
/// Concrete tasks embed one of these and expose it through
/// [`Task::state`](crate::task::Task::state). Status changes are atomic
/// compare-and-set transitions and the failure slot is write-once, so the
/// first recorded failure always wins.
#[derive(Debug)]
pub struct TaskState {
    id: TaskId,
    position: usize,
    target: TargetRef,
    status: AtomicU8,
    failure: OnceLock<ApiError>,
    warnings: Mutex<Vec<Warning>>,
    suppressed: Vec<WarningCode>,
    retry_policy: RetryPolicy,
    attempts: AtomicU32,
}

impl TaskState {
    pub fn new(position: usize, target: TargetRef, retry_policy: RetryPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            target,
            status: AtomicU8::new(TaskStatus::Uninitialized as u8),
            failure: OnceLock::new(),
            warnings: Mutex::new(Vec::new()),
            suppressed: Vec::new(),
            retry_policy,
            attempts: AtomicU32::new(0),
        }
    }

    /// Warning codes in this list are kept on the task but left out of responses
    pub fn with_suppressed_warnings(mut self, codes: Vec<WarningCode>) -> Self {
        self.suppressed = codes;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Number of times the result supplier has been invoked
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub(crate) fn record_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn transition(&self, from: TaskStatus, to: TaskStatus) -> Result<(), TaskStatus> {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(TaskStatus::from_u8)
    }

    /// `Uninitialized -> Ready`, called by the concrete task once it is fully built
    pub fn mark_ready(&self) -> bool {
        self.transition(TaskStatus::Uninitialized, TaskStatus::Ready)
            .is_ok()
    }

    /// `Ready -> InProgress`; returns the actual status when the guard fails
    pub(crate) fn begin(&self) -> Result<(), TaskStatus> {
        self.transition(TaskStatus::Ready, TaskStatus::InProgress)
    }

    /// `InProgress -> to`; fails when something else already ended the task
    pub(crate) fn finish(&self, to: TaskStatus) -> bool {
        self.transition(TaskStatus::InProgress, to).is_ok()
    }

    /// `Ready -> Skipped`; a no-op for tasks in any other status
    pub fn set_skipped_if_ready(&self) -> bool {
        self.transition(TaskStatus::Ready, TaskStatus::Skipped)
            .is_ok()
    }

    /// Record a failure and move the task to `Error`.
    ///
    /// Only the first failure is kept. Tasks already `Completed` or `Skipped`
    /// keep their status and the failure is discarded.
    pub fn maybe_add_failure(&self, error: ApiError) -> bool {
        let mut current = self.status();
        if current.is_terminal() && current != TaskStatus::Error {
            debug!(
                task_id = %self.id,
                status = %current,
                error = %error,
                "Discarding failure for task in terminal status"
            );
            return false;
        }

        if let Err(discarded) = self.failure.set(error) {
            debug!(
                task_id = %self.id,
                error = %discarded,
                "Task already has a failure, discarding later one"
            );
            return false;
        }

        while !current.is_terminal() {
            match self.transition(current, TaskStatus::Error) {
                Ok(()) => break,
                Err(actual) => current = actual,
            }
        }
        true
    }

    pub fn failure(&self) -> Option<&ApiError> {
        self.failure.get()
    }

    pub fn add_warning(&self, warning: Warning) {
        self.lock_warnings().push(warning);
    }

    /// Every warning recorded on the task, suppressed ones included
    pub fn warnings(&self) -> Vec<Warning> {
        self.lock_warnings().clone()
    }

    /// Warnings that belong in the response
    pub fn visible_warnings(&self) -> Vec<Warning> {
        self.lock_warnings()
            .iter()
            .filter(|w| !self.suppressed.contains(&w.code))
            .cloned()
            .collect()
    }

    pub fn suppressed_warnings(&self) -> &[WarningCode] {
        &self.suppressed
    }

    fn lock_warnings(&self) -> MutexGuard<'_, Vec<Warning>> {
        self.warnings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
