//! Request builders that turn a command into a runnable operation.
//!
//! Each builder decides task kinds, grouping and retry policies, and returns a
//! `Box<dyn RunnableOperation>` the caller runs with a [`CommandContext`].
//!
//! [`CommandContext`]: crate::context::CommandContext

pub mod insert;
pub mod read;
pub mod schema;


pub use insert::InsertPipeline;
pub use read::{ReadPipeline, ReadStatement};
pub use schema::{SchemaChange, SchemaPipeline};

use crate::config::EngineConfig;
use crate::context::CommandContext;
use crate::error::EngineError;
use crate::page::CommandResult;
use crate::task::RunnableOperation;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Run a built operation and materialize its response
pub async fn run_command(
    operation: Box<dyn RunnableOperation>,
    command: &str,
    config: Arc<EngineConfig>,
) -> Result<CommandResult, EngineError> {
    run_in_context(operation, &CommandContext::new(command, config)).await
}

/// Like [`run_command`], with a context prepared by the caller
pub async fn run_in_context(
    mut operation: Box<dyn RunnableOperation>,
    ctx: &CommandContext,
) -> Result<CommandResult, EngineError> {
    let deferred = operation.run(ctx).await?;
    let result = deferred.get().clone();
    debug!(
        command = %ctx.command,
        request_id = %ctx.request_id,
        elapsed_ms = (Utc::now() - ctx.received_at).num_milliseconds(),
        errors = result.errors.len(),
        "Command served"
    );
    Ok(result)
}
