//! In-memory integration tests for per-turn refresh.

use super::helpers::{Fleet, agent, names, server_name};
use mcp_fleet::tool_registry::domain::ServerStatus;
use rstest::{fixture, rstest};
use std::time::Duration;
use tokio::time::Instant;

#[fixture]
fn fleet() -> Fleet {
    let fleet = Fleet::new();
    fleet.server("linear", &["createIssue", "getIssues"]);
    fleet.assign("sofia", "linear");
    fleet
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn first_refresh_starts_assigned_servers(fleet: Fleet) {
    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(outcome.changed);
    assert!(!outcome.degraded);
    assert_eq!(names(&outcome.servers), ["linear"]);
    let linear = outcome.servers.first().expect("linear should be offered");
    assert_eq!(linear.tool_names(), ["createIssue", "getIssues"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stable_registry_reports_no_change(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;

    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(!outcome.changed);
    assert_eq!(names(&outcome.servers), ["linear"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn change_detection_is_tracked_per_agent(fleet: Fleet) {
    fleet.assign("ops", "linear");
    fleet.coordinator.refresh(&agent("sofia")).await;

    let ops = fleet.coordinator.refresh(&agent("ops")).await;

    assert!(ops.changed);
    assert_eq!(names(&ops.servers), ["linear"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_with_new_catalog_reports_change(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    fleet.catalog("linear", &["createIssue", "getIssues", "archiveIssue"]);

    fleet
        .registry()
        .request_restart(&server_name("linear"))
        .await
        .expect("linear is supervised");
    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(outcome.changed);
    let linear = outcome.servers.first().expect("linear should be offered");
    assert_eq!(linear.discovery_version(), 2);
    assert!(linear.tool("archiveIssue").is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn removed_descriptor_is_retired(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    fleet
        .store
        .remove_descriptor("linear")
        .expect("removal should succeed");

    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(outcome.changed);
    assert!(outcome.servers.is_empty());
    assert!(fleet.registry().get_server(&server_name("linear")).await.is_none());
    assert_eq!(
        fleet
            .driver
            .open_connections(&server_name("linear"))
            .expect("connection log"),
        0
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabling_and_re_enabling_restarts_server(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    let mut record = fleet.server("linear", &["createIssue", "getIssues"]);
    record.enabled = false;
    fleet
        .store
        .upsert_descriptor(record.clone())
        .expect("upsert should succeed");

    let disabled = fleet.coordinator.refresh(&agent("sofia")).await;
    assert!(disabled.servers.is_empty());

    record.enabled = true;
    fleet
        .store
        .upsert_descriptor(record)
        .expect("upsert should succeed");
    let enabled = fleet.coordinator.refresh(&agent("sofia")).await;

    assert_eq!(names(&enabled.servers), ["linear"]);
    assert_eq!(
        fleet
            .driver
            .connect_attempts(&server_name("linear"))
            .expect("attempt log"),
        2
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn manual_stop_survives_refresh(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    fleet
        .registry()
        .request_stop(&server_name("linear"))
        .await
        .expect("linear is supervised");

    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(outcome.changed);
    assert!(outcome.servers.is_empty());
    let status = fleet
        .registry()
        .status(&server_name("linear"))
        .await
        .expect("linear is supervised");
    assert_eq!(status.status(), ServerStatus::Stopped);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn crashed_server_is_excluded_on_next_refresh(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    fleet
        .driver
        .crash(&server_name("linear"))
        .expect("crash should succeed");

    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(outcome.servers.is_empty());
    assert!(outcome.changed);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn store_outage_keeps_previous_view(fleet: Fleet) {
    fleet.coordinator.refresh(&agent("sofia")).await;
    fleet
        .store
        .set_unavailable(true)
        .expect("store setup should succeed");

    let outcome = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(outcome.degraded);
    assert!(!outcome.changed);
    assert_eq!(names(&outcome.servers), ["linear"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn manual_start_only_server_waits_for_request(fleet: Fleet) {
    let mut record = fleet.server("postgres", &["query"]);
    record.auto_start = false;
    fleet
        .store
        .upsert_descriptor(record)
        .expect("upsert should succeed");
    fleet.assign("sofia", "postgres");

    let before = fleet.coordinator.refresh(&agent("sofia")).await;
    assert_eq!(names(&before.servers), ["linear"]);

    fleet
        .registry()
        .request_start(&server_name("postgres"))
        .await
        .expect("postgres is supervised");
    let after = fleet.coordinator.refresh(&agent("sofia")).await;

    assert!(after.changed);
    assert_eq!(names(&after.servers), ["linear", "postgres"]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_server_does_not_delay_other_agents(fleet: Fleet) {
    fleet.server("fast", &["query"]);
    fleet.assign("ops", "fast");
    let linear = server_name("linear");
    fleet
        .driver
        .set_always_failing(linear.clone(), true)
        .expect("failure setup should succeed");
    fleet
        .driver
        .set_connect_delay(linear, Duration::from_secs(25))
        .expect("delay setup should succeed");

    let started = Instant::now();
    let first = fleet.coordinator.refresh(&agent("ops")).await;
    let second = fleet.coordinator.refresh(&agent("ops")).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(names(&first.servers), ["fast"]);
    assert_eq!(names(&second.servers), ["fast"]);
    assert!(!second.changed);
}
