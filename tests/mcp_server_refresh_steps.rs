//! Behaviour tests for per-turn MCP server refresh.

use std::sync::Arc;

use eyre::{WrapErr, eyre};
use mcp_fleet::tool_registry::{
    adapters::{InMemoryMcpDriver, memory::InMemoryMcpServerConfigStore},
    domain::{
        AgentName, McpServerName, McpToolDefinition, PersistedServerDescriptor, SupervisionConfig,
    },
    services::{McpServerRegistry, RefreshCoordinator, RefreshOutcome},
};
use mockable::DefaultClock;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

type TestCoordinator =
    RefreshCoordinator<InMemoryMcpServerConfigStore, InMemoryMcpDriver, DefaultClock>;

struct RefreshWorld {
    store: Arc<InMemoryMcpServerConfigStore>,
    driver: Arc<InMemoryMcpDriver>,
    coordinator: TestCoordinator,
    last_outcome: Option<RefreshOutcome>,
}

impl RefreshWorld {
    fn new() -> Self {
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
            last_outcome: None,
        }
    }

    fn last_outcome(&self) -> Result<&RefreshOutcome, eyre::Report> {
        self.last_outcome
            .as_ref()
            .ok_or_else(|| eyre!("a refresh should have run"))
    }
}

#[fixture]
fn world() -> RefreshWorld {
    RefreshWorld::new()
}

fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

fn split_names(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).filter(|item| !item.is_empty()).collect()
}

fn server_name(name: &str) -> Result<McpServerName, eyre::Report> {
    McpServerName::new(name).wrap_err("valid server name expected")
}

fn agent_name(name: &str) -> Result<AgentName, eyre::Report> {
    AgentName::new(name).wrap_err("valid agent name expected")
}

fn offered_names(outcome: &RefreshOutcome) -> Vec<&str> {
    outcome
        .servers
        .iter()
        .map(|handle| handle.name().as_str())
        .collect()
}

#[given(r#"a stdio MCP server "{name}" offering tools "{tools}""#)]
fn stdio_server(world: &mut RefreshWorld, name: String, tools: String) -> Result<(), eyre::Report> {
    let definitions = split_names(&tools)
        .into_iter()
        .map(McpToolDefinition::named)
        .collect::<Result<Vec<_>, _>>()
        .wrap_err("tool definitions should be valid")?;
    world
        .driver
        .set_catalog(server_name(&name)?, definitions, Vec::new())
        .wrap_err("catalog setup should succeed")?;
    world
        .store
        .upsert_descriptor(PersistedServerDescriptor::stdio(
            name.as_str(),
            [format!("{name}-mcp")],
        ))
        .wrap_err("descriptor upsert should succeed")?;
    Ok(())
}

#[given(r#"server "{server}" is assigned to agent "{agent}""#)]
fn server_assigned(
    world: &mut RefreshWorld,
    server: String,
    agent: String,
) -> Result<(), eyre::Report> {
    world
        .store
        .assign(&agent, &server)
        .wrap_err("assignment should succeed")?;
    Ok(())
}

#[when(r#"agent "{agent}" refreshes its tools"#)]
fn agent_refreshes(world: &mut RefreshWorld, agent: String) -> Result<(), eyre::Report> {
    let outcome = run_async(world.coordinator.refresh(&agent_name(&agent)?));
    world.last_outcome = Some(outcome);
    Ok(())
}

#[when(r#"server "{server}" crashes"#)]
fn server_crashes(world: &mut RefreshWorld, server: String) -> Result<(), eyre::Report> {
    world
        .driver
        .crash(&server_name(&server)?)
        .wrap_err("crash should succeed")?;
    Ok(())
}

#[when(r#"server "{server}" is stopped"#)]
fn server_stopped(world: &mut RefreshWorld, server: String) -> Result<(), eyre::Report> {
    run_async(
        world
            .coordinator
            .registry()
            .request_stop(&server_name(&server)?),
    )
    .wrap_err("server should be supervised")?;
    Ok(())
}

#[then(r#"the refresh offers servers "{names}""#)]
fn refresh_offers_servers(world: &RefreshWorld, names: String) -> Result<(), eyre::Report> {
    let offered = offered_names(world.last_outcome()?);
    let expected = split_names(&names);
    if offered != expected {
        return Err(eyre!("expected servers {expected:?}, got {offered:?}"));
    }
    Ok(())
}

#[then("the refresh offers no servers")]
fn refresh_offers_nothing(world: &RefreshWorld) -> Result<(), eyre::Report> {
    let offered = offered_names(world.last_outcome()?);
    if !offered.is_empty() {
        return Err(eyre!("expected no servers, got {offered:?}"));
    }
    Ok(())
}

#[then(r#"server "{server}" offers tools "{tools}""#)]
fn server_offers_tools(
    world: &RefreshWorld,
    server: String,
    tools: String,
) -> Result<(), eyre::Report> {
    let handle = world
        .last_outcome()?
        .servers
        .iter()
        .find(|handle| handle.name().as_str() == server)
        .ok_or_else(|| eyre!("server {server} should be offered"))?;
    let expected = split_names(&tools);
    if handle.tool_names() != expected {
        return Err(eyre!(
            "expected tools {expected:?}, got {:?}",
            handle.tool_names()
        ));
    }
    Ok(())
}

#[then("the refresh reports a change")]
fn refresh_reports_change(world: &RefreshWorld) -> Result<(), eyre::Report> {
    if !world.last_outcome()?.changed {
        return Err(eyre!("expected the refresh to report a change"));
    }
    Ok(())
}

#[then("the refresh reports no change")]
fn refresh_reports_no_change(world: &RefreshWorld) -> Result<(), eyre::Report> {
    if world.last_outcome()?.changed {
        return Err(eyre!("expected the refresh to report no change"));
    }
    Ok(())
}

#[then(r#"agent "{agent}" is offered no servers"#)]
fn agent_offered_nothing(world: &RefreshWorld, agent: String) -> Result<(), eyre::Report> {
    let servers = run_async(world.coordinator.registry().servers_for(&agent_name(&agent)?));
    if !servers.is_empty() {
        return Err(eyre!("expected no servers for {agent}, got {}", servers.len()));
    }
    Ok(())
}

#[then(r#"server "{server}" was stopped once"#)]
fn server_stopped_once(world: &RefreshWorld, server: String) -> Result<(), eyre::Report> {
    let stops = world
        .driver
        .stop_calls(&server_name(&server)?)
        .wrap_err("stop log should be readable")?;
    if stops != 1 {
        return Err(eyre!("expected one stop for {server}, got {stops}"));
    }
    Ok(())
}

#[scenario(
    path = "tests/features/mcp_server_refresh.feature",
    name = "Assigned running server offers its tools"
)]
#[tokio::test(flavor = "multi_thread")]
async fn assigned_server_offers_tools(world: RefreshWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/mcp_server_refresh.feature",
    name = "Crashed server is excluded on the next turn"
)]
#[tokio::test(flavor = "multi_thread")]
async fn crashed_server_is_excluded(world: RefreshWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/mcp_server_refresh.feature",
    name = "Unchanged registry reports no change"
)]
#[tokio::test(flavor = "multi_thread")]
async fn unchanged_registry_reports_no_change(world: RefreshWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/mcp_server_refresh.feature",
    name = "Stopping a shared server removes it for every agent"
)]
#[tokio::test(flavor = "multi_thread")]
async fn stopping_shared_server(world: RefreshWorld) {
    let _ = world;
}
