//! Error types for MCP server domain validation and parsing.

use super::ServerStatus;
use thiserror::Error;

/// Errors returned while constructing tool registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistryDomainError {
    /// The server name is empty after trimming.
    #[error("MCP server name must not be empty")]
    EmptyServerName,

    /// The server name contains characters outside `[a-z0-9_-]`.
    #[error(
        "MCP server name '{0}' contains invalid characters (only lowercase alphanumeric, hyphens and underscores allowed)"
    )]
    InvalidServerName(String),

    /// The server name exceeds the 100-character storage limit.
    #[error("MCP server name exceeds 100 character limit: {0}")]
    ServerNameTooLong(String),

    /// The agent name is empty after trimming.
    #[error("agent name must not be empty")]
    EmptyAgentName,

    /// The STDIO command is empty.
    #[error("STDIO command must not be empty")]
    EmptyStdioCommand,

    /// The STDIO working directory is empty after trimming.
    #[error("STDIO working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// The HTTP base URL is empty.
    #[error("HTTP base URL must not be empty")]
    EmptyHttpBaseUrl,

    /// The HTTP base URL does not have an `http://` or `https://` prefix.
    #[error("HTTP base URL '{0}' must start with 'http://' or 'https://'")]
    InvalidHttpBaseUrl(String),

    /// The retry budget exceeds the supported maximum.
    #[error("max retries {value} exceeds the limit of {limit}")]
    RetryLimitExceeded {
        /// Requested retry count.
        value: u32,
        /// Largest accepted retry count.
        limit: u32,
    },

    /// The operation timeout is outside the supported range.
    #[error("timeout of {value}s is outside the accepted range {min}..={max}")]
    TimeoutOutOfRange {
        /// Requested timeout in seconds.
        value: u32,
        /// Smallest accepted timeout.
        min: u32,
        /// Largest accepted timeout.
        max: u32,
    },

    /// A tool definition name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// Transitioning between two lifecycle states is invalid.
    #[error("invalid MCP server lifecycle transition: {from} -> {to}")]
    InvalidLifecycleTransition {
        /// Current lifecycle state.
        from: ServerStatus,
        /// Requested target lifecycle state.
        to: ServerStatus,
    },
}

/// Error returned while parsing a server status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown MCP server status: {0}")]
pub struct ParseServerStatusError(pub String);

/// Error returned while parsing a transport kind from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown MCP transport kind: {0}")]
pub struct ParseTransportKindError(pub String);
