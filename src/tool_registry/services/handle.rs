//! Immutable server snapshots handed to the agent runtime.

use crate::tool_registry::{
    domain::{McpServerName, McpToolDefinition, ServerDescriptor, ServerRuntimeState, ServerStatus, ToolCallOutcome},
    ports::{McpConnection, McpDriverError},
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a forwarded tool call.
///
/// Tool call failures never change the server's lifecycle state.
#[derive(Debug, Clone, Error)]
pub enum InvocationError {
    /// The snapshot was taken while the server was not running.
    #[error("MCP server {server} is {status}, not running")]
    NotRunning {
        /// Server name.
        server: McpServerName,
        /// Status captured in the snapshot.
        status: ServerStatus,
    },

    /// The server did not advertise the tool.
    #[error("MCP server {server} has no tool named '{tool}'")]
    UnknownTool {
        /// Server name.
        server: McpServerName,
        /// Requested tool.
        tool: String,
    },

    /// The call could not be delivered or answered.
    #[error("calling '{tool}' on MCP server {server} failed: {source}")]
    Driver {
        /// Server name.
        server: McpServerName,
        /// Requested tool.
        tool: String,
        /// Underlying driver failure.
        #[source]
        source: McpDriverError,
    },

    /// The server executed the call and reported a failure.
    #[error("tool '{tool}' on MCP server {server} reported an error: {message}")]
    ToolFailed {
        /// Server name.
        server: McpServerName,
        /// Requested tool.
        tool: String,
        /// Text returned by the server.
        message: String,
    },
}

/// Snapshot of one supervised server: descriptor, runtime state, and the
/// tool catalog discovered on the connection it was taken from.
///
/// A handle stays bound to that connection; after a restart a fresh handle
/// with a higher discovery version must be obtained.
#[derive(Clone)]
pub struct ServerHandle {
    descriptor: Arc<ServerDescriptor>,
    state: ServerRuntimeState,
    tools: Arc<[McpToolDefinition]>,
    connection: Option<Arc<dyn McpConnection>>,
}

impl ServerHandle {
    pub(crate) fn new(
        descriptor: Arc<ServerDescriptor>,
        state: ServerRuntimeState,
        tools: Arc<[McpToolDefinition]>,
        connection: Option<Arc<dyn McpConnection>>,
    ) -> Self {
        Self {
            descriptor,
            state,
            tools,
            connection,
        }
    }

    /// Returns the server name.
    #[must_use]
    pub fn name(&self) -> &McpServerName {
        self.descriptor.name()
    }

    /// Returns the descriptor the server was supervised with.
    #[must_use]
    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Returns the runtime state at snapshot time.
    #[must_use]
    pub const fn state(&self) -> &ServerRuntimeState {
        &self.state
    }

    /// Returns the lifecycle status at snapshot time.
    #[must_use]
    pub const fn status(&self) -> ServerStatus {
        self.state.status()
    }

    /// Returns the catalog version at snapshot time.
    #[must_use]
    pub const fn discovery_version(&self) -> u64 {
        self.state.discovery_version()
    }

    /// Returns the discovered tool definitions.
    #[must_use]
    pub fn tools(&self) -> &[McpToolDefinition] {
        &self.tools
    }

    /// Returns the discovered tool names in catalog order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(McpToolDefinition::name).collect()
    }

    /// Looks up one tool definition.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&McpToolDefinition> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Forwards a tool call over the snapshot's connection.
    ///
    /// The call is bounded by the server's `timeout_seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] when the server was not running, the tool
    /// is unknown, the call fails in transit, or the server reports a tool
    /// failure.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolCallOutcome, InvocationError> {
        let connection = match &self.connection {
            Some(connection) if self.status().accepts_dispatch() => connection,
            _ => {
                return Err(InvocationError::NotRunning {
                    server: self.name().clone(),
                    status: self.status(),
                });
            }
        };

        if self.tool(tool).is_none() {
            return Err(InvocationError::UnknownTool {
                server: self.name().clone(),
                tool: tool.to_owned(),
            });
        }

        let timeout = self.descriptor.timeout();
        let outcome = tokio::time::timeout(timeout, connection.call_tool(tool, arguments))
            .await
            .map_err(|_| McpDriverError::timeout(format!("tools/call {tool}"), timeout))
            .and_then(|result| result)
            .map_err(|source| InvocationError::Driver {
                server: self.name().clone(),
                tool: tool.to_owned(),
                source,
            })?;

        if outcome.is_error {
            return Err(InvocationError::ToolFailed {
                server: self.name().clone(),
                tool: tool.to_owned(),
                message: outcome.joined_text(),
            });
        }
        Ok(outcome)
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServerHandle")
            .field("name", self.name())
            .field("status", &self.status())
            .field("discovery_version", &self.discovery_version())
            .field("tools", &self.tool_names())
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
