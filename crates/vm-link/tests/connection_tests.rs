//! Integration tests for connect, reconnect and disconnect.

#![cfg(feature = "mock")]

mod common;

use std::time::Duration;

use tokio::time::Instant;
use tracing::Level;
use vm_link::config::{DEFAULT_BOOT_TIME_COMMAND, ReconnectConfig};
use vm_link::transport::mock::{MockCommand, MockConnector};
use vm_link::{ConnectionManager, LinkError, RetryStrategy};

use common::{CapturedLogs, StaticProbe, scripted, test_config};

#[tokio::test]
async fn connect_opens_transport_and_seeds_baseline() {
    let (mut link, connector, _) = scripted(true);
    assert!(!link.is_connected());

    link.connect().await.unwrap();

    assert!(link.is_connected());
    assert!(link.session().last_boot_time().is_some());
    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(connector.active_transports(), 1);
}

#[tokio::test]
async fn connect_failure_is_wrapped() {
    let (mut link, connector, _) = scripted(true);
    connector.fail_connects(1, "connection refused");

    let err = link.connect().await.unwrap_err();
    assert!(err.is_connection_failed());
    let msg = err.to_string();
    assert!(msg.contains("vm-01"), "{msg}");
    assert!(msg.contains("connection refused"), "{msg}");
    assert!(!link.is_connected());
}

#[tokio::test]
async fn unreadable_boot_time_leaves_session_disconnected() {
    let (mut link, connector, _) = scripted(true);
    connector.set_response(DEFAULT_BOOT_TIME_COMMAND, MockCommand::new().exit_code(1));

    let err = link.connect().await.unwrap_err();
    assert!(matches!(err, LinkError::BootTimeUnavailable { .. }), "{err}");
    assert!(!link.is_connected());
    assert!(!link.session().has_transport());
    assert!(link.session().last_boot_time().is_none());
    assert_eq!(connector.active_transports(), 0);
}

#[tokio::test]
async fn connecting_again_replaces_transport() {
    let (mut link, connector, _) = scripted(true);
    link.connect().await.unwrap();
    link.connect().await.unwrap();

    assert_eq!(connector.connect_attempts(), 2);
    assert_eq!(connector.active_transports(), 1);
}

#[tokio::test]
async fn reconnect_keeps_active_connection() {
    let (mut link, connector, _) = scripted(true);
    link.connect().await.unwrap();

    link.reconnect(false, 3, Duration::from_secs(1)).await.unwrap();

    assert_eq!(connector.connect_attempts(), 1);
    assert!(link.is_connected());
}

#[tokio::test]
async fn reconnect_restores_dropped_connection() {
    let (mut link, connector, _) = scripted(true);
    link.connect().await.unwrap();
    connector.drop_connections();
    assert!(!link.is_connected());

    link.reconnect(false, 3, Duration::ZERO).await.unwrap();

    assert!(link.is_connected());
    assert_eq!(connector.connect_attempts(), 2);
}

#[tokio::test]
async fn forced_reconnect_replaces_active_connection() {
    let (mut link, connector, _) = scripted(true);
    link.connect().await.unwrap();

    link.reconnect(true, 1, Duration::ZERO).await.unwrap();

    assert_eq!(connector.connect_attempts(), 2);
    assert_eq!(connector.active_transports(), 1);
}

#[tokio::test]
async fn reconnect_survives_transient_failures() {
    let (mut link, connector, _) = scripted(true);
    connector.fail_connects(2, "no route to host");

    link.reconnect(false, 3, Duration::ZERO).await.unwrap();

    assert!(link.is_connected());
    assert_eq!(connector.connect_attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_retries() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (mut link, connector, _) = scripted(true);
    connector.fail_connects(10, "connection refused");

    let started = Instant::now();
    let err = link
        .reconnect(true, 3, Duration::from_secs(2))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_connection_failed());
    assert!(err.to_string().contains("3 attempts"), "{err}");
    assert_eq!(connector.connect_attempts(), 3);
    assert_eq!(logs.count(Level::WARN, "Reconnect attempt failed"), 3);
    // Two pauses between three attempts, none after the last.
    assert!(elapsed >= Duration::from_secs(4), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn unreadable_boot_time_warns_once_per_attempt() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (mut link, connector, _) = scripted(true);
    connector.set_response(DEFAULT_BOOT_TIME_COMMAND, MockCommand::new().exit_code(1));

    let err = link
        .reconnect(true, 3, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(err.is_connection_failed());
    assert_eq!(connector.connect_attempts(), 3);
    assert_eq!(logs.count(Level::WARN, ""), 3);
    assert_eq!(logs.count(Level::WARN, "Reconnect attempt failed"), 3);
    assert!(!link.is_connected());
}

#[tokio::test(start_paused = true)]
async fn reconnect_default_uses_configured_policy() {
    let connector = MockConnector::new().with_uptime(common::UPTIME);
    let config = test_config().with_reconnect(ReconnectConfig {
        retries: 2,
        delay: Duration::from_secs(1),
    });
    let mut link = ConnectionManager::with_probe(config, connector.clone(), StaticProbe::new(true));
    connector.fail_connects(5, "timeout");

    assert!(link.reconnect_default(false).await.is_err());
    assert_eq!(connector.connect_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_with_backoff_strategy() {
    let (mut link, connector, _) = scripted(true);
    connector.fail_connects(3, "connection reset");

    let started = Instant::now();
    link.reconnect_with(true, &RetryStrategy::exponential(Duration::from_secs(1), 5))
        .await
        .unwrap();

    // 1s + 2s + 4s before the fourth attempt succeeds.
    assert_eq!(connector.connect_attempts(), 4);
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert!(link.is_connected());
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (mut link, connector, _) = scripted(true);
    link.connect().await.unwrap();

    link.disconnect().await;
    assert!(!link.is_connected());
    assert!(!link.session().has_transport());
    assert!(link.session().last_boot_time().is_none());
    assert_eq!(connector.active_transports(), 0);

    link.disconnect().await;
    assert!(!link.is_connected());
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let (mut link, connector, _) = scripted(true);
    link.connect().await.unwrap();
    link.disconnect().await;

    link.reconnect(false, 1, Duration::ZERO).await.unwrap();
    assert!(link.is_connected());
    assert_eq!(connector.connect_attempts(), 2);
}
