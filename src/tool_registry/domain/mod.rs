//! Domain model for MCP server supervision and discovery.
//!
//! The tool registry domain models server identity, descriptors and their
//! transport configuration, the supervision state machine, discovered
//! catalogs, and agent assignments. Infrastructure concerns remain outside
//! this boundary.

mod assignment;
mod descriptor;
mod discovery;
mod error;
mod ids;
mod policy;
mod runtime;
mod status;
mod tool;
mod transport;

pub use assignment::{AgentAssignment, AssignmentSet, PersistedAssignment};
pub use descriptor::{
    MAX_RETRIES_LIMIT, MAX_TIMEOUT_SECONDS, MIN_TIMEOUT_SECONDS, PersistedServerDescriptor,
    ServerDescriptor,
};
pub use discovery::{CatalogFingerprint, Discovery};
pub use error::{ParseServerStatusError, ParseTransportKindError, ToolRegistryDomainError};
pub use ids::{AgentName, McpServerName};
pub use policy::{BackoffPolicy, SupervisionConfig};
pub use runtime::ServerRuntimeState;
pub use status::ServerStatus;
pub use tool::{McpToolDefinition, ToolCallOutcome};
pub use transport::{HttpTransportConfig, McpTransport, StdioTransportConfig, TransportKind};
