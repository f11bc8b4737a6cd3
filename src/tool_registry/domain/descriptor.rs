//! MCP server descriptor: identity plus desired configuration.

use super::{
    HttpTransportConfig, McpServerName, McpTransport, StdioTransportConfig, ToolRegistryDomainError,
    TransportKind,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Largest accepted automatic retry budget.
pub const MAX_RETRIES_LIMIT: u32 = 20;

/// Smallest accepted per-operation timeout in seconds.
pub const MIN_TIMEOUT_SECONDS: u32 = 1;

/// Largest accepted per-operation timeout in seconds.
pub const MAX_TIMEOUT_SECONDS: u32 = 3600;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

/// Validated configuration of one MCP server.
///
/// Descriptors are owned by configuration admins; the lifecycle manager only
/// reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    name: McpServerName,
    transport: McpTransport,
    auto_start: bool,
    max_retries: u32,
    timeout_seconds: u32,
    priority: i32,
    tags: BTreeSet<String>,
    enabled: bool,
}

/// Unvalidated descriptor fields as they come out of the configuration
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedServerDescriptor {
    /// Unique server name.
    pub name: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Command tokens for `stdio` servers; the first token is the executable.
    #[serde(default)]
    pub command: Vec<String>,
    /// Environment variables for `stdio` servers.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional working directory for `stdio` servers.
    #[serde(default)]
    pub working_directory: Option<String>,
    /// Base URL for `http` servers.
    #[serde(default)]
    pub url: Option<String>,
    /// Extra request headers for `http` servers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Whether the refresh coordinator should start the server proactively.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Automatic retry budget after a failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for each driver operation, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    /// Ordering weight within an agent's tool set; higher comes first.
    #[serde(default)]
    pub priority: i32,
    /// Free-form categorization.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Whether the server may run at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PersistedServerDescriptor {
    /// Creates a `stdio` record with default settings.
    #[must_use]
    pub fn stdio<I, T>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::blank(name.into(), TransportKind::Stdio)
        }
    }

    /// Creates an `http` record with default settings.
    #[must_use]
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::blank(name.into(), TransportKind::Http)
        }
    }

    fn blank(name: String, transport: TransportKind) -> Self {
        Self {
            name,
            transport,
            command: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            url: None,
            headers: BTreeMap::new(),
            auto_start: true,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            priority: 0,
            tags: BTreeSet::new(),
            enabled: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_timeout_seconds() -> u32 {
    DEFAULT_TIMEOUT_SECONDS
}

impl ServerDescriptor {
    /// Creates an enabled, auto-starting descriptor with default retry and
    /// timeout settings.
    #[must_use]
    pub fn new(name: McpServerName, transport: McpTransport) -> Self {
        Self {
            name,
            transport,
            auto_start: true,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            priority: 0,
            tags: BTreeSet::new(),
            enabled: true,
        }
    }

    /// Validates and converts a persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when the name or transport is
    /// invalid, or when the retry or timeout bounds are exceeded.
    pub fn from_persisted(record: PersistedServerDescriptor) -> Result<Self, ToolRegistryDomainError> {
        let PersistedServerDescriptor {
            name,
            transport,
            command,
            env,
            working_directory,
            url,
            headers,
            auto_start,
            max_retries,
            timeout_seconds,
            priority,
            tags,
            enabled,
        } = record;

        let server_name = McpServerName::new(name)?;
        let server_transport = match transport {
            TransportKind::Stdio => {
                let mut config = StdioTransportConfig::from_tokens(command)?.with_env(env);
                if let Some(directory) = working_directory {
                    config = config.with_working_directory(directory)?;
                }
                McpTransport::Stdio(config)
            }
            TransportKind::Http => {
                let base_url = url.unwrap_or_default();
                McpTransport::Http(HttpTransportConfig::new(base_url)?.with_headers(headers))
            }
        };

        Self::new(server_name, server_transport)
            .with_auto_start(auto_start)
            .with_max_retries(max_retries)?
            .with_timeout_seconds(timeout_seconds)
            .map(|descriptor| {
                descriptor
                    .with_priority(priority)
                    .with_tags(tags)
                    .with_enabled(enabled)
            })
    }

    /// Sets whether the server is started proactively.
    #[must_use]
    pub const fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Sets the automatic retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::RetryLimitExceeded`] when the value
    /// exceeds [`MAX_RETRIES_LIMIT`].
    pub fn with_max_retries(mut self, max_retries: u32) -> Result<Self, ToolRegistryDomainError> {
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(ToolRegistryDomainError::RetryLimitExceeded {
                value: max_retries,
                limit: MAX_RETRIES_LIMIT,
            });
        }
        self.max_retries = max_retries;
        Ok(self)
    }

    /// Sets the per-operation timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::TimeoutOutOfRange`] when the value
    /// is outside [`MIN_TIMEOUT_SECONDS`]`..=`[`MAX_TIMEOUT_SECONDS`].
    pub fn with_timeout_seconds(
        mut self,
        timeout_seconds: u32,
    ) -> Result<Self, ToolRegistryDomainError> {
        if timeout_seconds < MIN_TIMEOUT_SECONDS || timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ToolRegistryDomainError::TimeoutOutOfRange {
                value: timeout_seconds,
                min: MIN_TIMEOUT_SECONDS,
                max: MAX_TIMEOUT_SECONDS,
            });
        }
        self.timeout_seconds = timeout_seconds;
        Ok(self)
    }

    /// Sets the ordering weight.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Sets whether the server may run.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &McpServerName {
        &self.name
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &McpTransport {
        &self.transport
    }

    /// Returns whether the server starts proactively.
    #[must_use]
    pub const fn auto_start(&self) -> bool {
        self.auto_start
    }

    /// Returns the automatic retry budget.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the per-operation timeout in seconds.
    #[must_use]
    pub const fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    /// Returns the per-operation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    /// Returns the ordering weight.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the tags.
    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns whether the server may run.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether switching to `other` requires a fresh connection.
    ///
    /// Priority, tags, and retry budget apply to a live connection as-is.
    #[must_use]
    pub fn requires_reconnect(&self, other: &Self) -> bool {
        self.transport != other.transport || self.timeout_seconds != other.timeout_seconds
    }
}
