//! Tests for the blocking wrapper.

#![cfg(feature = "mock")]

mod common;

use std::time::Duration;

use vm_link::transport::mock::{MockCommand, MockConnector};
use vm_link::{BlockingConnection, HealthStatus};

use common::{StaticProbe, UPTIME, test_config};

fn blocking(connector: &MockConnector) -> BlockingConnection<MockConnector, StaticProbe> {
    BlockingConnection::with_probe(test_config(), connector.clone(), StaticProbe::new(true))
        .expect("Failed to create blocking connection")
}

#[test]
fn blocking_round_trip() {
    let connector = MockConnector::new().with_uptime(UPTIME);
    connector.respond("hostname", MockCommand::new().stdout("vm-01\n"));
    let mut link = blocking(&connector);

    link.connect().unwrap();
    assert!(link.is_connected());
    assert!(link.session().last_boot_time().is_some());

    let (result, lines) = link.execute_collect("hostname", None).unwrap();
    assert!(result.success());
    assert_eq!(lines, ["[stdout]: vm-01"]);

    let mut count = 0;
    link.execute("hostname", Some(Duration::from_secs(5)), |_| count += 1)
        .unwrap();
    assert_eq!(count, 1);

    assert_eq!(link.check_health().unwrap(), HealthStatus::Healthy);
    assert!(link.is_alive().unwrap());

    link.disconnect();
    assert!(!link.is_connected());
}

#[test]
fn blocking_reconnect_and_reboot_check() {
    let connector = MockConnector::new().with_uptime(UPTIME);
    let mut link = blocking(&connector);

    link.reconnect(false, 2, Duration::ZERO).unwrap();
    assert_eq!(connector.connect_attempts(), 1);

    connector.set_uptime(Duration::from_secs(1));
    let current = link.boot_time().unwrap();
    assert!(link.check_for_reboot(current).unwrap_err().is_reboot());

    link.reconnect_default(true).unwrap();
    assert_eq!(connector.connect_attempts(), 2);
    assert!(link.ping_host(1, Duration::from_secs(1)));
}

#[test]
fn blocking_connect_failure() {
    let connector = MockConnector::new();
    connector.fail_connects(1, "refused");
    let mut link = blocking(&connector);

    assert!(link.connect().unwrap_err().is_connection_failed());
}
