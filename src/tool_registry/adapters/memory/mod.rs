//! In-memory adapters for the tool registry ports.

mod store;

pub use store::InMemoryMcpServerConfigStore;
