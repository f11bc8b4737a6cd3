//! Connection driver port for reaching MCP servers.

use crate::tool_registry::domain::{
    McpServerName, McpToolDefinition, ServerDescriptor, ToolCallOutcome, TransportKind,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for driver and connection operations.
pub type McpDriverResult<T> = Result<T, McpDriverError>;

/// Opens connections to MCP servers.
///
/// A successful `connect` has already completed the MCP initialization
/// handshake.
#[async_trait]
pub trait McpDriver: Send + Sync {
    /// Launches or dials the server described by `descriptor`.
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
    ) -> McpDriverResult<Arc<dyn McpConnection>>;
}

/// Live, initialized connection to one MCP server.
///
/// Agents bind against this capability, never against a concrete transport.
#[async_trait]
pub trait McpConnection: Send + Sync {
    /// Lists every tool the server exposes.
    async fn list_tools(&self) -> McpDriverResult<Vec<McpToolDefinition>>;

    /// Lists resource URIs the server exposes.
    async fn list_resources(&self) -> McpDriverResult<Vec<String>>;

    /// Forwards a tool call.
    async fn call_tool(&self, name: &str, arguments: Value) -> McpDriverResult<ToolCallOutcome>;

    /// Checks liveness. `Ok(false)` means the server answered but is not
    /// healthy.
    async fn ping(&self) -> McpDriverResult<bool>;

    /// Shuts the connection down, escalating once `timeout` elapses.
    async fn stop(&self, timeout: Duration) -> McpDriverResult<()>;

    /// Returns whether the connection has already gone away.
    fn is_closed(&self) -> bool;

    /// Resolves once the connection goes away on its own.
    async fn closed(&self);
}

/// Errors returned by driver adapters.
#[derive(Debug, Clone, Error)]
pub enum McpDriverError {
    /// The server process could not be launched.
    #[error("failed to spawn '{command}': {message}")]
    Spawn {
        /// Executable that failed to start.
        command: String,
        /// Operating system error text.
        message: String,
    },

    /// The server could not be reached or the connection broke.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server sent something that is not valid MCP.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error.
    #[error("server returned error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },

    /// An operation missed its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Name of the operation.
        operation: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The driver cannot handle the descriptor's transport.
    #[error("transport '{transport}' of MCP server {server} is not supported by this driver")]
    UnsupportedTransport {
        /// Server name.
        server: McpServerName,
        /// Rejected transport.
        transport: TransportKind,
    },

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// Generic runtime failure.
    #[error("MCP driver runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl McpDriverError {
    /// Wraps a runtime error from the driver adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }

    /// Creates a timeout error for `operation`.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Returns whether the failure came from malformed or rejected protocol
    /// traffic rather than from reaching the server.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Remote { .. })
    }
}
