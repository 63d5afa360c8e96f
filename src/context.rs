use crate::config::EngineConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Per-request context handed to every task execution
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub request_id: Uuid,
    /// Name of the command being served, e.g. "insertMany"
    pub command: String,
    pub tenant: Option<String>,
    pub config: Arc<EngineConfig>,
    pub received_at: DateTime<Utc>,
}

impl CommandContext {
    pub fn new(command: impl Into<String>, config: Arc<EngineConfig>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            command: command.into(),
            tenant: None,
            config,
            received_at: Utc::now(),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new("unknown", Arc::new(EngineConfig::default()))
    }
}
