use crate::error::TaskFault;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

/// One-shot producer of a task attempt's result.
///
/// Building a supplier must not start any I/O; the work begins only when the
/// engine invokes it. The description names what the attempt does (e.g. the
/// statement text) and is handed to fault mapping if the attempt fails.
pub struct ResultSupplier<R> {
    description: String,
    thunk: Box<dyn FnOnce() -> BoxFuture<'static, Result<R, TaskFault>> + Send>,
}

impl<R: Send + 'static> ResultSupplier<R> {
    pub fn new<F, Fut>(description: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, TaskFault>> + Send + 'static,
    {
        Self {
            description: description.into(),
            thunk: Box::new(move || f().boxed()),
        }
    }

    /// Supplier whose attempt fails with `fault`, for tasks that cannot be built
    pub fn failing(description: impl Into<String>, fault: TaskFault) -> Self {
        Self::new(description, move || async move { Err(fault) })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn invoke(
        self,
        attempt: u32,
    ) -> (AttemptContext, BoxFuture<'static, Result<R, TaskFault>>) {
        let context = AttemptContext {
            attempt,
            description: self.description,
        };
        (context, (self.thunk)())
    }
}

impl<R> fmt::Debug for ResultSupplier<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSupplier")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// What the last attempt tried, handed to fault mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based attempt number
    pub attempt: u32,
    pub description: String,
}

type Thunk<R> = Box<dyn FnOnce() -> R + Send>;

/// Lazily computed, memoized value.
///
/// The thunk runs on the first [`get`](Deferred::get) and never again, so
/// repeated reads return the same value. Clones share the cell.
pub struct Deferred<R> {
    cell: Arc<LazyLock<R, Thunk<R>>>,
}

impl<R> Deferred<R> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let thunk: Thunk<R> = Box::new(f);
        Self {
            cell: Arc::new(LazyLock::new(thunk)),
        }
    }

    pub fn get(&self) -> &R {
        LazyLock::force(&self.cell)
    }

    /// Derive a new deferred value without forcing this one
    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        R: Send + Sync + 'static,
        F: FnOnce(&R) -> U + Send + 'static,
    {
        Deferred::new(move || f(self.get()))
    }
}

impl<R> Clone for Deferred<R> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<R> fmt::Debug for Deferred<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}
