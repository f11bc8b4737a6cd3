//! Read model over the persistent MCP server configuration store.

use crate::tool_registry::domain::{
    McpServerName, PersistedAssignment, PersistedServerDescriptor, ServerRuntimeState,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for configuration store operations.
pub type ConfigStoreResult<T> = Result<T, ConfigStoreError>;

/// Access to server descriptors and agent assignments owned by
/// configuration admins.
///
/// Records are returned unvalidated; validation happens during
/// reconciliation so one malformed row cannot hide the others.
#[async_trait]
pub trait McpServerConfigStore: Send + Sync {
    /// Returns every server descriptor.
    async fn list_descriptors(&self) -> ConfigStoreResult<Vec<PersistedServerDescriptor>>;

    /// Returns every agent-server assignment.
    async fn list_assignments(&self) -> ConfigStoreResult<Vec<PersistedAssignment>>;

    /// Records the latest runtime state of a server for auditing.
    ///
    /// Callers treat failures as non-fatal.
    async fn write_runtime_status(
        &self,
        server: &McpServerName,
        state: &ServerRuntimeState,
    ) -> ConfigStoreResult<()>;
}

/// Errors returned by configuration store implementations.
#[derive(Debug, Clone, Error)]
pub enum ConfigStoreError {
    /// The store cannot be reached.
    #[error("configuration store unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),

    /// The store was reached but the operation failed.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ConfigStoreError {
    /// Wraps a connectivity failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
