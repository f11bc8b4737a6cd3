//! Adapter implementations for the MCP driver and configuration store
//! ports.

pub mod memory;

mod http;
mod protocol;
mod router;
mod runtime;
mod session;
mod stdio;

pub use http::{HttpMcpDriver, SESSION_HEADER};
pub use router::TransportRouter;
pub use runtime::InMemoryMcpDriver;
pub use stdio::StdioMcpDriver;
