//! Port contracts for MCP server supervision.

mod driver;
mod store;

pub use driver::{McpConnection, McpDriver, McpDriverError, McpDriverResult};
pub use store::{ConfigStoreError, ConfigStoreResult, McpServerConfigStore};
