//! # Datagate
//!
//! Task orchestration and retry engine for a document API gateway backed by a
//! wide-column database.
//!
//! A client command (insert many documents, read a range, create a table and
//! its indexes) is broken into tasks, each owning one unit of work against the
//! backend or an embedding provider. The engine runs them with a per-task retry
//! policy, sequentially with fail-fast or in parallel, and folds the terminal
//! tasks into a single response that reports per-task errors and warnings.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: `Task` trait, lifecycle state machine, retry loop, groups and operations
//! - **[`page`]**: response shape and the accumulators that build it
//! - **[`tasks`]**: concrete task kinds (statements, embeddings, nested stages)
//! - **[`pipeline`]**: request builders producing runnable operations
//! - **[`backend`]**: storage and embedding collaborator seams
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datagate::backend::ScriptedBackend;
//! use datagate::pipeline::{InsertPipeline, run_command};
//! use datagate::EngineConfig;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(EngineConfig::default());
//!     let backend = Arc::new(ScriptedBackend::new());
//!
//!     let operation = InsertPipeline::new("users", backend)
//!         .ordered(true)
//!         .build(vec![json!({"_id": "ada"}), json!({"_id": "grace"})], &config);
//!
//!     let result = run_command(operation, "insertMany", config).await?;
//!     println!("{}", result.to_json());
//!     Ok(())
//! }
//! ```

/// Error types: raw task faults, user-facing API errors and engine failures.
pub mod error;

/// Engine configuration loaded from TOML.
pub mod config;

/// Per-request context handed to every task.
pub mod context;

/// Core task engine.
///
/// Lifecycle state machine, fixed-delay retries, sequential and parallel task
/// groups, and the operation that drives a group into an accumulator.
pub mod task;

/// Response shape and result pages.
pub mod page;

/// Storage backend and embedding provider seams, with scripted in-memory versions.
pub mod backend;

/// Concrete task kinds.
pub mod tasks;

/// Request builders for insert, read and schema commands.
pub mod pipeline;

// Re-export main engine types
pub use task::{
    Deferred, RetryPolicy, RunnableOperation, Task, TaskAccumulator, TaskGroup, TaskOperation,
    TaskStatus,
};

// Re-export response types
pub use page::{CommandResult, ResultPage};

// Re-export error and config types
pub use config::EngineConfig;
pub use context::CommandContext;
pub use error::{ApiError, EngineError, ErrorCode, TaskFault};
