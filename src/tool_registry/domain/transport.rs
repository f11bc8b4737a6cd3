//! MCP server transport configuration value objects.

use super::{ParseTransportKindError, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transport settings for an MCP server hosted over STDIO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioTransportConfig {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl StdioTransportConfig {
    /// Creates a new STDIO transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyStdioCommand`] when `command`
    /// is empty after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(ToolRegistryDomainError::EmptyStdioCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Creates a configuration from an ordered token list where the first
    /// token is the executable and the rest are its arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyStdioCommand`] when there are
    /// no tokens or the first token is blank.
    pub fn from_tokens(
        tokens: impl IntoIterator<Item = String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let mut iter = tokens.into_iter();
        let command = iter.next().ok_or(ToolRegistryDomainError::EmptyStdioCommand)?;
        Ok(Self::new(command)?.with_args(iter))
    }

    /// Appends command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces process environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

/// Transport settings for an MCP server reached over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    base_url: String,
    headers: BTreeMap<String, String>,
}

impl HttpTransportConfig {
    /// Creates a new HTTP transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when `base_url` is empty or does
    /// not start with `http://` or `https://`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized_base_url = base_url.into().trim().to_owned();
        if normalized_base_url.is_empty() {
            return Err(ToolRegistryDomainError::EmptyHttpBaseUrl);
        }

        let has_valid_prefix = normalized_base_url.starts_with("http://")
            || normalized_base_url.starts_with("https://");
        if !has_valid_prefix {
            return Err(ToolRegistryDomainError::InvalidHttpBaseUrl(
                normalized_base_url,
            ));
        }

        Ok(Self {
            base_url: normalized_base_url,
            headers: BTreeMap::new(),
        })
    }

    /// Replaces the extra request headers sent with every call.
    #[must_use]
    pub fn with_headers(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers = values.into_iter().collect();
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the extra request headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Supported MCP transport configuration variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum McpTransport {
    /// MCP over local process STDIO.
    Stdio(StdioTransportConfig),
    /// MCP over HTTP.
    Http(HttpTransportConfig),
}

impl McpTransport {
    /// Creates a `stdio` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`StdioTransportConfig::new`].
    pub fn stdio(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::Stdio(StdioTransportConfig::new(command)?))
    }

    /// Creates an `http` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`HttpTransportConfig::new`].
    pub fn http(base_url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::Http(HttpTransportConfig::new(base_url)?))
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Http(_) => TransportKind::Http,
        }
    }
}

/// Discriminant of [`McpTransport`], as stored by configuration admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Local subprocess over standard input/output.
    Stdio,
    /// Remote HTTP endpoint.
    Http,
}

impl TransportKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportKind {
    type Error = ParseTransportKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" | "sse" | "http_sse" => Ok(Self::Http),
            _ => Err(ParseTransportKindError(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn stdio_from_tokens_splits_command_and_args() {
        let config = StdioTransportConfig::from_tokens(
            ["npx", "@mcp/server-linear"].map(String::from),
        )
        .expect("valid tokens");

        assert_eq!(config.command(), "npx");
        assert_eq!(config.args(), ["@mcp/server-linear"]);
    }

    #[test]
    fn stdio_from_empty_tokens_is_rejected() {
        let result = StdioTransportConfig::from_tokens(Vec::new());
        assert_eq!(result, Err(ToolRegistryDomainError::EmptyStdioCommand));
    }

    #[rstest]
    #[case("", ToolRegistryDomainError::EmptyHttpBaseUrl)]
    #[case(
        "ftp://example.com",
        ToolRegistryDomainError::InvalidHttpBaseUrl(String::from("ftp://example.com"))
    )]
    fn invalid_http_urls_are_rejected(
        #[case] url: &str,
        #[case] expected: ToolRegistryDomainError,
    ) {
        assert_eq!(HttpTransportConfig::new(url), Err(expected));
    }

    #[rstest]
    #[case("stdio", TransportKind::Stdio)]
    #[case("HTTP", TransportKind::Http)]
    #[case("sse", TransportKind::Http)]
    fn transport_kind_parses_storage_values(#[case] raw: &str, #[case] expected: TransportKind) {
        assert_eq!(TransportKind::try_from(raw), Ok(expected));
    }

    #[test]
    fn transport_serializes_with_kind_tag() {
        let transport = McpTransport::http("https://mcp.example.com/mcp").expect("valid url");
        let value = serde_json::to_value(&transport).expect("serializable transport");
        assert_eq!(value["kind"], "http");
        assert_eq!(value["config"]["base_url"], "https://mcp.example.com/mcp");
    }
}
