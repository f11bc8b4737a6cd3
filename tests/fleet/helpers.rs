//! Shared fixtures for in-memory fleet tests.

use std::sync::Arc;

use mcp_fleet::tool_registry::{
    adapters::{InMemoryMcpDriver, memory::InMemoryMcpServerConfigStore},
    domain::{AgentName, McpServerName, McpToolDefinition, PersistedServerDescriptor, SupervisionConfig},
    services::{McpServerRegistry, RefreshCoordinator, ServerHandle},
};
use mockable::DefaultClock;

/// Registry type used by the in-memory tests.
pub type TestRegistry =
    McpServerRegistry<InMemoryMcpServerConfigStore, InMemoryMcpDriver, DefaultClock>;

/// Coordinator type used by the in-memory tests.
pub type TestCoordinator =
    RefreshCoordinator<InMemoryMcpServerConfigStore, InMemoryMcpDriver, DefaultClock>;

/// Store, driver, and coordinator wired together.
pub struct Fleet {
    pub store: Arc<InMemoryMcpServerConfigStore>,
    pub driver: Arc<InMemoryMcpDriver>,
    pub coordinator: TestCoordinator,
}

impl Fleet {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryMcpServerConfigStore::new());
        let driver = Arc::new(InMemoryMcpDriver::new());
        let registry = McpServerRegistry::new(
            store.clone(),
            driver.clone(),
            Arc::new(DefaultClock),
            SupervisionConfig::default(),
        );
        Self {
            store,
            driver,
            coordinator: RefreshCoordinator::new(Arc::new(registry)),
        }
    }

    pub fn registry(&self) -> &TestRegistry {
        self.coordinator.registry()
    }

    /// Configures a stdio server with the given tools.
    pub fn server(&self, name: &str, tools: &[&str]) -> PersistedServerDescriptor {
        let record = PersistedServerDescriptor::stdio(name, [format!("{name}-mcp")]);
        self.catalog(name, tools);
        self.store
            .upsert_descriptor(record.clone())
            .expect("descriptor upsert should succeed");
        record
    }

    /// Replaces the catalog the driver serves for `name`.
    pub fn catalog(&self, name: &str, tools: &[&str]) {
        let definitions = tools
            .iter()
            .map(|tool| McpToolDefinition::named(*tool).expect("valid tool"))
            .collect();
        self.driver
            .set_catalog(server_name(name), definitions, Vec::new())
            .expect("catalog setup should succeed");
    }

    pub fn assign(&self, agent: &str, server: &str) {
        self.store
            .assign(agent, server)
            .expect("assignment should succeed");
    }
}

pub fn agent(name: &str) -> AgentName {
    AgentName::new(name).expect("valid agent name")
}

pub fn server_name(name: &str) -> McpServerName {
    McpServerName::new(name).expect("valid server name")
}

pub fn names(servers: &[ServerHandle]) -> Vec<&str> {
    servers.iter().map(|handle| handle.name().as_str()).collect()
}
