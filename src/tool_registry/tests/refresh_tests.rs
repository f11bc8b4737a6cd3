//! Unit tests for refresh reconciliation against a mocked store.

use std::io;
use std::sync::Arc;

use crate::tool_registry::{
    adapters::InMemoryMcpDriver,
    domain::{
        AgentName, McpServerName, McpToolDefinition, PersistedAssignment,
        PersistedServerDescriptor, ServerRuntimeState, SupervisionConfig,
    },
    ports::{ConfigStoreError, ConfigStoreResult, McpServerConfigStore},
    services::{McpServerRegistry, RefreshCoordinator},
};
use async_trait::async_trait;
use mockable::DefaultClock;
use rstest::{fixture, rstest};

mockall::mock! {
    pub Store {}

    #[async_trait]
    impl McpServerConfigStore for Store {
        async fn list_descriptors(&self) -> ConfigStoreResult<Vec<PersistedServerDescriptor>>;
        async fn list_assignments(&self) -> ConfigStoreResult<Vec<PersistedAssignment>>;
        async fn write_runtime_status(
            &self,
            server: &McpServerName,
            runtime: &ServerRuntimeState,
        ) -> ConfigStoreResult<()>;
    }
}

type TestCoordinator = RefreshCoordinator<MockStore, InMemoryMcpDriver, DefaultClock>;

fn sofia() -> AgentName {
    AgentName::new("sofia").expect("valid agent")
}

#[fixture]
fn driver() -> Arc<InMemoryMcpDriver> {
    let driver = InMemoryMcpDriver::new();
    for server in ["linear", "github"] {
        driver
            .set_catalog(
                McpServerName::new(server).expect("valid name"),
                vec![McpToolDefinition::named(format!("{server}_search")).expect("valid tool")],
                Vec::new(),
            )
            .expect("catalog setup should succeed");
    }
    Arc::new(driver)
}

fn coordinator(store: MockStore, driver: Arc<InMemoryMcpDriver>) -> TestCoordinator {
    let registry = McpServerRegistry::new(
        Arc::new(store),
        driver,
        Arc::new(DefaultClock),
        SupervisionConfig::default(),
    );
    RefreshCoordinator::new(Arc::new(registry))
}

fn offline() -> ConfigStoreError {
    ConfigStoreError::unavailable(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "connection refused",
    ))
}

fn names(servers: &[crate::tool_registry::services::ServerHandle]) -> Vec<&str> {
    servers.iter().map(|handle| handle.name().as_str()).collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn store_outage_serves_cached_servers(driver: Arc<InMemoryMcpDriver>) {
    let mut store = MockStore::new();
    let mut descriptor_reads = 0_u32;
    store.expect_list_descriptors().returning(move || {
        descriptor_reads += 1;
        if descriptor_reads == 1 {
            Ok(vec![PersistedServerDescriptor::stdio("linear", ["linear-mcp"])])
        } else {
            Err(offline())
        }
    });
    store
        .expect_list_assignments()
        .returning(|| Ok(vec![PersistedAssignment::new("sofia", "linear")]));
    store
        .expect_write_runtime_status()
        .returning(|_, _| Ok(()));
    let coordinator = coordinator(store, driver);

    let first = coordinator.refresh(&sofia()).await;
    let second = coordinator.refresh(&sofia()).await;

    assert!(first.changed);
    assert!(!first.degraded);
    assert_eq!(names(&first.servers), ["linear"]);
    assert!(second.degraded);
    assert!(!second.changed);
    assert_eq!(names(&second.servers), ["linear"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_descriptor_does_not_block_valid_ones(driver: Arc<InMemoryMcpDriver>) {
    let mut store = MockStore::new();
    store.expect_list_descriptors().returning(|| {
        Ok(vec![
            PersistedServerDescriptor::stdio("Bad Name!", ["broken-mcp"]),
            PersistedServerDescriptor::stdio("github", Vec::<String>::new()),
            PersistedServerDescriptor::stdio("linear", ["linear-mcp"]),
        ])
    });
    store.expect_list_assignments().returning(|| {
        Ok(vec![
            PersistedAssignment::new("sofia", "linear"),
            PersistedAssignment::new("sofia", "github"),
            PersistedAssignment::new("", "linear"),
        ])
    });
    store
        .expect_write_runtime_status()
        .returning(|_, _| Ok(()));
    let coordinator = coordinator(store, driver);

    let outcome = coordinator.refresh(&sofia()).await;

    assert!(!outcome.degraded);
    assert_eq!(names(&outcome.servers), ["linear"]);
    assert_eq!(
        coordinator.registry().supervised_names().await,
        [McpServerName::new("linear").expect("valid name")]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_status_writes_never_hide_servers(driver: Arc<InMemoryMcpDriver>) {
    let mut store = MockStore::new();
    store.expect_list_descriptors().returning(|| {
        let mut disabled = PersistedServerDescriptor::stdio("github", ["github-mcp"]);
        disabled.enabled = false;
        Ok(vec![
            disabled,
            PersistedServerDescriptor::stdio("linear", ["linear-mcp"]),
        ])
    });
    store.expect_list_assignments().returning(|| {
        Ok(vec![
            PersistedAssignment::new("sofia", "linear"),
            PersistedAssignment::new("sofia", "github"),
        ])
    });
    store
        .expect_write_runtime_status()
        .returning(|_, _| Err(ConfigStoreError::persistence(io::Error::other("read-only"))));
    let coordinator = coordinator(store, driver.clone());

    let outcome = coordinator.refresh(&sofia()).await;

    assert_eq!(names(&outcome.servers), ["linear"]);
    let github = McpServerName::new("github").expect("valid name");
    assert_eq!(driver.connect_attempts(&github).expect("attempt log"), 0);
    coordinator.shutdown().await;
}
