//! MCP tool metadata and tool call results.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata for a tool exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
}

impl McpToolDefinition {
    /// Creates a tool definition.
    ///
    /// Servers are free to omit descriptions, so only the name is required.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyToolName`] when the name is
    /// empty after trimming.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: description.into().trim().to_owned(),
            input_schema,
        })
    }

    /// Creates a definition with an empty description and an open object
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyToolName`] when the name is
    /// empty after trimming.
    pub fn named(name: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Self::new(name, "", serde_json::json!({ "type": "object" }))
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool description, possibly empty.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the JSON schema of the tool arguments.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// Result of a forwarded `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    /// Content blocks returned by the server.
    pub content: Vec<Value>,
    /// Whether the server flagged the call as failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallOutcome {
    /// Creates a successful outcome holding one text block.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({ "type": "text", "text": value.into() })],
            is_error: false,
        }
    }

    /// Concatenates the text blocks, separated by newlines.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
