//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use vm_link::config::{ExecConfig, LinkConfig, SessionConfig};
use vm_link::liveness::EchoProbe;
use vm_link::transport::mock::MockConnector;
use vm_link::ConnectionManager;

/// Uptime reported by freshly scripted hosts.
pub const UPTIME: Duration = Duration::from_secs(3600);

/// Config for a test host with a short reader grace period.
pub fn test_config() -> LinkConfig {
    LinkConfig::new("vm-01")
        .with_session(SessionConfig::new("vm-01").username("ci").key_path("/keys/ci"))
        .with_exec(ExecConfig::default().reader_grace(Duration::from_millis(500)))
}

/// A manager over a scripted host, plus a handle to script it.
pub fn scripted(reachable: bool) -> (ConnectionManager<MockConnector, StaticProbe>, MockConnector, StaticProbe) {
    let connector = MockConnector::new().with_uptime(UPTIME);
    let probe = StaticProbe::new(reachable);
    let manager = ConnectionManager::with_probe(test_config(), connector.clone(), probe.clone());
    (manager, connector, probe)
}

/// Echo probe with a fixed answer that records how it was called.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    reachable: bool,
    calls: Arc<AtomicU32>,
    last_count: Arc<AtomicU32>,
}

impl StaticProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_count(&self) -> u32 {
        self.last_count.load(Ordering::SeqCst)
    }
}

impl EchoProbe for StaticProbe {
    async fn probe(&self, _host: &str, count: u32, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_count.store(count, Ordering::SeqCst);
        self.reachable
    }
}

/// One captured log event.
#[derive(Debug, Clone)]
pub struct Captured {
    pub level: Level,
    pub message: String,
}

/// A tracing layer that records every event's level and message.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<Captured>>>);

impl CapturedLogs {
    /// Route this thread's events here until the guard drops.
    pub fn install(&self) -> DefaultGuard {
        tracing::subscriber::set_default(Registry::default().with(self.clone()))
    }

    /// Events at `level` whose message contains `needle`.
    pub fn count(&self, level: Level, needle: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == level && event.message.contains(needle))
            .count()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.0.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
