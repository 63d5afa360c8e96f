//! In-memory collaborators driven by scripted rules.
//!
//! Used by the tests and the demo binary in place of a real cluster or
//! embedding service.

use crate::backend::{Backend, EmbeddingProvider, ResultSet, Statement};
use crate::error::TaskFault;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// How the backend answers statements matching a rule
#[derive(Debug, Clone)]
pub enum Behavior {
    Rows(Vec<Value>),
    /// Conditional write found an existing row
    NotApplied,
    Fail(TaskFault),
    /// Fail the first `times` calls, then answer with rows
    FailTimes {
        times: usize,
        fault: TaskFault,
        then: Vec<Value>,
    },
    /// Rows plus a backend warning
    RowsWithWarning(Vec<Value>, String),
    /// Wait before answering
    Delayed(Duration, Box<Behavior>),
}

impl Behavior {
    fn respond(&self, call: usize) -> (Option<Duration>, Result<ResultSet, TaskFault>) {
        match self {
            Behavior::Rows(rows) => (None, Ok(ResultSet::rows(rows.clone()))),
            Behavior::NotApplied => (None, Ok(ResultSet::not_applied())),
            Behavior::Fail(fault) => (None, Err(fault.clone())),
            Behavior::FailTimes { times, fault, then } => {
                if call < *times {
                    (None, Err(fault.clone()))
                } else {
                    (None, Ok(ResultSet::rows(then.clone())))
                }
            }
            Behavior::RowsWithWarning(rows, warning) => (
                None,
                Ok(ResultSet::rows(rows.clone()).with_warning(warning.clone())),
            ),
            Behavior::Delayed(delay, inner) => {
                let (_, result) = inner.respond(call);
                (Some(*delay), result)
            }
        }
    }
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    behavior: Behavior,
    calls: AtomicUsize,
}

/// Backend answering by the first rule whose pattern occurs in the statement
///
/// Patterns are matched against [`Statement::describe`], so bound values such
/// as document ids can be targeted. Unmatched statements get an empty result.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    rules: Vec<Rule>,
    executed: Mutex<Vec<Statement>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: impl Into<String>, behavior: Behavior) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            behavior,
            calls: AtomicUsize::new(0),
        });
        self
    }

    /// Every statement executed so far, in call order
    pub fn executed(&self) -> Vec<Statement> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.executed()
            .iter()
            .filter(|statement| statement.describe().contains(pattern))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.executed().len()
    }
}

impl Backend for ScriptedBackend {
    fn execute(&self, statement: Statement) -> BoxFuture<'_, Result<ResultSet, TaskFault>> {
        let described = statement.describe();
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement);

        let (delay, result) = match self
            .rules
            .iter()
            .find(|rule| described.contains(&rule.pattern))
        {
            Some(rule) => {
                let call = rule.calls.fetch_add(1, Ordering::SeqCst);
                rule.behavior.respond(call)
            }
            None => (None, Ok(ResultSet::empty())),
        };

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
        .boxed()
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}

/// Deterministic embedding provider with optional scripted failures
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    failures_left: AtomicUsize,
    failure: Option<TaskFault>,
    poison_text: Option<(String, TaskFault)>,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            failures_left: AtomicUsize::new(0),
            failure: None,
            poison_text: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first `times` requests with `fault`
    pub fn failing_first(mut self, times: usize, fault: TaskFault) -> Self {
        self.failures_left = AtomicUsize::new(times);
        self.failure = Some(fault);
        self
    }

    /// Fail every request that contains a text including `pattern`
    pub fn failing_on(mut self, pattern: impl Into<String>, fault: TaskFault) -> Self {
        self.poison_text = Some((pattern.into(), fault));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector this provider returns for `text`
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let seed: u32 = text.bytes().map(u32::from).sum();
        (0..self.dimension)
            .map(|i| ((seed + i as u32) % 97) as f32 / 97.0)
            .collect()
    }

    fn scripted_failure(&self, texts: &[String]) -> Option<TaskFault> {
        if let Some((pattern, fault)) = &self.poison_text
            && texts.iter().any(|text| text.contains(pattern.as_str()))
        {
            return Some(fault.clone());
        }
        let remaining = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match (remaining, &self.failure) {
            (Ok(_), Some(fault)) => Some(fault.clone()),
            _ => None,
        }
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn vectorize(&self, texts: Vec<String>) -> BoxFuture<'_, Result<Vec<Vec<f32>>, TaskFault>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.scripted_failure(&texts) {
            Some(fault) => Err(fault),
            None => Ok(texts.iter().map(|text| self.embed(text)).collect()),
        };
        async move { result }.boxed()
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
