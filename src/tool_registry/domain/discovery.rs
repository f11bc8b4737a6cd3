//! Discovered catalog of an MCP server.

use super::McpToolDefinition;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// SHA-256 digest identifying a discovered catalog.
pub type CatalogFingerprint = [u8; 32];

/// Tools and resources reported by one successful discovery.
///
/// Entries keep the order the server reported them in; later duplicates are
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    tools: Vec<McpToolDefinition>,
    resources: Vec<String>,
}

impl Discovery {
    /// Creates a catalog, removing duplicate tool names and resource URIs.
    #[must_use]
    pub fn new(
        tools: impl IntoIterator<Item = McpToolDefinition>,
        resources: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut seen_tools = HashSet::new();
        let unique_tools = tools
            .into_iter()
            .filter(|tool| seen_tools.insert(tool.name().to_owned()))
            .collect();

        let mut seen_resources = HashSet::new();
        let unique_resources = resources
            .into_iter()
            .filter(|uri| seen_resources.insert(uri.clone()))
            .collect();

        Self {
            tools: unique_tools,
            resources: unique_resources,
        }
    }

    /// Returns the discovered tool definitions.
    #[must_use]
    pub fn tools(&self) -> &[McpToolDefinition] {
        &self.tools
    }

    /// Returns the discovered resource URIs.
    #[must_use]
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Returns the discovered tool names in catalog order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_owned()).collect()
    }

    /// Splits the catalog into its tools and resources.
    #[must_use]
    pub fn into_parts(self) -> (Vec<McpToolDefinition>, Vec<String>) {
        (self.tools, self.resources)
    }

    /// Hashes the catalog contents, including descriptions and schemas.
    #[must_use]
    pub fn fingerprint(&self) -> CatalogFingerprint {
        let mut hasher = Sha256::new();
        for tool in &self.tools {
            hasher.update(b"tool\0");
            hasher.update(tool.name().as_bytes());
            hasher.update(b"\0");
            hasher.update(tool.description().as_bytes());
            hasher.update(b"\0");
            hasher.update(tool.input_schema().to_string().as_bytes());
            hasher.update(b"\0");
        }
        for uri in &self.resources {
            hasher.update(b"resource\0");
            hasher.update(uri.as_bytes());
            hasher.update(b"\0");
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> McpToolDefinition {
        McpToolDefinition::named(name).expect("valid tool")
    }

    #[test]
    fn duplicates_are_dropped_in_order() {
        let discovery = Discovery::new(
            [tool("getIssues"), tool("createIssue"), tool("getIssues")],
            ["linear://teams", "linear://teams"].map(String::from),
        );
        assert_eq!(discovery.tool_names(), ["getIssues", "createIssue"]);
        assert_eq!(discovery.resources(), ["linear://teams"]);
    }

    #[test]
    fn fingerprint_tracks_catalog_changes() {
        let first = Discovery::new([tool("createIssue")], Vec::new());
        let same = Discovery::new([tool("createIssue")], Vec::new());
        let grown = Discovery::new([tool("createIssue"), tool("getIssues")], Vec::new());

        assert_eq!(first.fingerprint(), same.fingerprint());
        assert_ne!(first.fingerprint(), grown.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_tools_from_resources() {
        let as_tool = Discovery::new([tool("a")], Vec::new());
        let as_resource = Discovery::new(Vec::new(), [String::from("a")]);
        assert_ne!(as_tool.fingerprint(), as_resource.fingerprint());
    }
}
