//! In-memory integration tests for registry queries and management.

use super::helpers::{Fleet, agent, names, server_name};
use mcp_fleet::tool_registry::{domain::ServerStatus, services::RegistryError};
use rstest::{fixture, rstest};

#[fixture]
fn fleet() -> Fleet {
    let fleet = Fleet::new();
    for (name, priority) in [("github", 5), ("linear", 5), ("sentry", 1), ("postgres", 9)] {
        let mut record = fleet.server(name, &["search"]);
        record.priority = priority;
        fleet
            .store
            .upsert_descriptor(record)
            .expect("upsert should succeed");
        fleet.assign("sofia", name);
    }
    fleet.assign("ops", "postgres");
    fleet
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn servers_are_ordered_by_priority_then_name(fleet: Fleet) {
    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert_eq!(
        names(&outcome.servers),
        ["postgres", "github", "linear", "sentry"]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unassigned_agent_sees_no_servers(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;

    let servers = fleet.registry().servers_for(&agent("nobody")).await;

    assert!(servers.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopping_shared_server_removes_it_for_every_agent(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    fleet.coordinator.refresh(&agent("ops")).await;

    let state = fleet
        .registry()
        .request_stop(&server_name("postgres"))
        .await
        .expect("postgres is supervised");

    assert_eq!(state.status(), ServerStatus::Stopped);
    let sofia = fleet.registry().servers_for(&agent("sofia")).await;
    let ops = fleet.registry().servers_for(&agent("ops")).await;
    assert!(!names(&sofia).contains(&"postgres"));
    assert!(ops.is_empty());
    assert_eq!(
        fleet
            .driver
            .stop_calls(&server_name("postgres"))
            .expect("stop log"),
        1
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn management_of_unknown_server_is_rejected(fleet: Fleet) {
    let missing = server_name("jira");

    let result = fleet.registry().request_start(&missing).await;

    assert_eq!(result, Err(RegistryError::UnknownServer(missing)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn in_memory_assignment_takes_effect_immediately(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    fleet.coordinator.refresh(&agent("ops")).await;

    let added = fleet
        .registry()
        .assign_server(agent("ops"), server_name("linear"))
        .await;
    let duplicate = fleet
        .registry()
        .assign_server(agent("ops"), server_name("linear"))
        .await;

    assert!(added);
    assert!(!duplicate);
    let servers = fleet.registry().servers_for(&agent("ops")).await;
    assert_eq!(names(&servers), ["postgres", "linear"]);

    let removed = fleet
        .registry()
        .unassign_server(&agent("ops"), &server_name("postgres"))
        .await;
    assert!(removed);
    let remaining = fleet.registry().servers_for(&agent("ops")).await;
    assert_eq!(names(&remaining), ["linear"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_server_stays_inspectable(fleet: Fleet) {
    fleet
        .driver
        .set_always_failing(server_name("sentry"), true)
        .expect("failure setup should succeed");

    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(!names(&outcome.servers).contains(&"sentry"));
    let sentry = fleet
        .registry()
        .get_server(&server_name("sentry"))
        .await
        .expect("sentry is supervised");
    assert_eq!(sentry.status(), ServerStatus::Error);
    assert!(sentry.state().last_error().is_some());
    fleet.coordinator.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invocation_reaches_the_server(fleet: Fleet) {
    let outcome = fleet.coordinator.refresh(&agent("ops")).await;
    let postgres = outcome.servers.first().expect("postgres should be offered");

    let reply = postgres
        .invoke("search", serde_json::json!({"q": "orders"}))
        .await
        .expect("call should succeed");
    let unknown = postgres.invoke("drop_table", serde_json::json!({})).await;

    assert!(reply.joined_text().starts_with("search"));
    assert!(unknown.is_err());
}
