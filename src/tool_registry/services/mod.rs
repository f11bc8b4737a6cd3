//! Application services: per-server supervision, the registry queried by
//! the agent runtime, and per-turn refresh.

mod handle;
mod refresh;
mod registry;
mod supervisor;

pub use handle::{InvocationError, ServerHandle};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use registry::{McpServerRegistry, RegistryError, RegistryResult};
pub use supervisor::ServerSupervisor;
