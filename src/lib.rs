//! MCP fleet: supervision of the Model Context Protocol servers an agent
//! runtime depends on.
//!
//! The crate keeps a registry of configured MCP servers, supervises each
//! server's lifecycle (start, health monitoring, bounded retry, stop), and
//! answers the agent runtime's per-turn question: which servers, and which
//! tools, are usable by this agent right now.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: descriptors, lifecycle state, and assignments with no
//!   infrastructure dependencies
//! - **Ports**: trait interfaces for MCP drivers and the configuration store
//! - **Adapters**: stdio and HTTP drivers plus in-memory implementations
//!
//! # Modules
//!
//! - [`tool_registry`]: MCP server supervision and the tool registry

pub mod tool_registry;
