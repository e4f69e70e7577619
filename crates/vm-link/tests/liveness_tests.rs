//! Integration tests for liveness checks.

#![cfg(feature = "mock")]

mod common;

use std::time::Duration;

use tracing::Level;
use vm_link::config::LivenessConfig;
use vm_link::transport::mock::MockConnector;
use vm_link::{ConnectionManager, HealthStatus};

use common::{CapturedLogs, scripted, test_config};

#[tokio::test]
async fn healthy_host_needs_no_ping() {
    let (mut link, _, probe) = scripted(true);
    link.connect().await.unwrap();

    assert_eq!(link.check_health().await.unwrap(), HealthStatus::Healthy);
    assert!(link.is_alive().await.unwrap());
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn broken_ssh_falls_back_to_ping() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (mut link, connector, probe) = scripted(true);
    link.connect().await.unwrap();
    connector.drop_connections();

    assert_eq!(link.check_health().await.unwrap(), HealthStatus::Degraded);
    assert!(link.is_alive().await.unwrap());
    assert_eq!(probe.calls(), 2);
    assert_eq!(probe.last_count(), 1);
    assert_eq!(logs.count(Level::WARN, "SSH boot time check failed"), 2);
}

#[tokio::test]
async fn unreachable_host_is_connection_failure() {
    let (mut link, connector, probe) = scripted(false);
    link.connect().await.unwrap();
    connector.drop_connections();

    let err = link.is_alive().await.unwrap_err();
    assert!(err.is_connection_failed());
    assert!(err.to_string().contains("not reachable via SSH or ping"));
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn never_connected_host_is_checked_by_ping() {
    let (mut link, _, probe) = scripted(true);

    assert_eq!(link.check_health().await.unwrap(), HealthStatus::Degraded);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn reboot_falls_back_to_ping_and_resets_baseline() {
    let (mut link, connector, probe) = scripted(true);
    link.connect().await.unwrap();
    let before = link.session().last_boot_time().unwrap();

    connector.set_uptime(Duration::from_secs(5));
    assert_eq!(link.check_health().await.unwrap(), HealthStatus::Degraded);
    assert_eq!(probe.calls(), 1);

    let after = link.session().last_boot_time().unwrap();
    assert!(after.drift(before) > 3000.0);

    // The new boot time is now the baseline.
    assert_eq!(link.check_health().await.unwrap(), HealthStatus::Healthy);
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn ping_host_passes_count_through() {
    let (link, _, probe) = scripted(true);

    assert!(link.ping_host(4, Duration::from_secs(1)).await);
    assert_eq!(probe.last_count(), 4);
}

#[cfg(unix)]
fn with_ping_program(program: &str) -> ConnectionManager<MockConnector> {
    let config = test_config().with_liveness(LivenessConfig {
        ping_program: program.to_string(),
        ..LivenessConfig::default()
    });
    ConnectionManager::new(config, MockConnector::new())
}

#[cfg(unix)]
#[tokio::test]
async fn ping_program_exit_status_decides() {
    assert!(with_ping_program("true").ping_host(1, Duration::from_secs(2)).await);
    assert!(!with_ping_program("false").ping_host(1, Duration::from_secs(2)).await);
    assert!(
        !with_ping_program("/nonexistent/vm-link-ping")
            .ping_host(1, Duration::from_secs(2))
            .await
    );
}

#[cfg(unix)]
#[tokio::test]
async fn ping_program_drives_is_alive() {
    let mut link = with_ping_program("true");
    assert!(link.is_alive().await.unwrap());

    let mut link = with_ping_program("false");
    assert!(link.is_alive().await.unwrap_err().is_connection_failed());
}
