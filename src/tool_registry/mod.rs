//! MCP server supervision and tool registry.
//!
//! Server descriptors are read from a configuration store and reconciled
//! into one supervisor per enabled server. Supervisors connect through an
//! [`ports::McpDriver`], discover tools, watch connection health, and retry
//! failures with exponential backoff. The registry answers which running
//! servers an agent may use. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
