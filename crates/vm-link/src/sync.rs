//! Synchronous wrapper for the async connection manager.
//!
//! This module provides a blocking API for callers without an async runtime.
//! The wrapper owns a small multi-threaded runtime so that transport
//! background tasks (such as the SSH connection driver) keep running between
//! calls.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::config::LinkConfig;
use crate::connection::ConnectionManager;
use crate::error::{LinkError, Result};
use crate::exec::ExecutionResult;
use crate::liveness::{EchoProbe, HealthStatus, PingProbe};
use crate::reboot::BootTime;
use crate::session::Session;
use crate::transport::Connector;

/// A blocking connection to one host.
pub struct BlockingConnection<C: Connector, P = PingProbe> {
    /// The tokio runtime.
    runtime: Runtime,
    /// The inner async manager.
    inner: ConnectionManager<C, P>,
}

impl<C: Connector, P> std::fmt::Debug for BlockingConnection<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingConnection")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|e| LinkError::io_context("creating tokio runtime", e))
}

impl<C: Connector> BlockingConnection<C> {
    /// Create a disconnected wrapper.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created.
    pub fn new(config: LinkConfig, connector: C) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            inner: ConnectionManager::new(config, connector),
        })
    }
}

impl<C: Connector, P: EchoProbe> BlockingConnection<C, P> {
    /// Create a disconnected wrapper with a custom echo probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created.
    pub fn with_probe(config: LinkConfig, connector: C, probe: P) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            inner: ConnectionManager::with_probe(config, connector, probe),
        })
    }

    /// The wrapped async manager.
    #[must_use]
    pub const fn inner(&self) -> &ConnectionManager<C, P> {
        &self.inner
    }

    /// The session.
    #[must_use]
    pub const fn session(&self) -> &Session<C::Transport> {
        self.inner.session()
    }

    /// Whether the connection is active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Connect and record the baseline boot time.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`].
    pub fn connect(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.connect())
    }

    /// Reconnect with a fixed delay between attempts.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::reconnect`].
    pub fn reconnect(&mut self, force: bool, retries: u32, delay: Duration) -> Result<()> {
        self.runtime
            .block_on(self.inner.reconnect(force, retries, delay))
    }

    /// Reconnect using the configured policy.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::reconnect_default`].
    pub fn reconnect_default(&mut self, force: bool) -> Result<()> {
        self.runtime.block_on(self.inner.reconnect_default(force))
    }

    /// Close the connection.
    pub fn disconnect(&mut self) {
        self.runtime.block_on(self.inner.disconnect());
    }

    /// Run `command`, passing each formatted output line to `on_line`.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::execute`].
    pub fn execute<F: FnMut(&str)>(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
        on_line: F,
    ) -> Result<ExecutionResult> {
        self.runtime
            .block_on(self.inner.execute(command, timeout, on_line))
    }

    /// Run `command` and collect its output lines.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::execute`].
    pub fn execute_collect(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<(ExecutionResult, Vec<String>)> {
        self.runtime
            .block_on(self.inner.execute_collect(command, timeout))
    }

    /// Read the host's current boot time.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::boot_time`].
    pub fn boot_time(&mut self) -> Result<BootTime> {
        self.runtime.block_on(self.inner.boot_time())
    }

    /// Compare `current` with the recorded baseline.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::check_for_reboot`].
    pub fn check_for_reboot(&mut self, current: BootTime) -> Result<()> {
        self.inner.check_for_reboot(current)
    }

    /// Check the host over SSH with an echo probe fallback.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::check_health`].
    pub fn check_health(&mut self) -> Result<HealthStatus> {
        self.runtime.block_on(self.inner.check_health())
    }

    /// Whether the host is reachable by either check.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::is_alive`].
    pub fn is_alive(&mut self) -> Result<bool> {
        self.runtime.block_on(self.inner.is_alive())
    }

    /// Probe the host with `count` echo requests.
    #[must_use]
    pub fn ping_host(&self, count: u32, timeout: Duration) -> bool {
        self.runtime.block_on(self.inner.ping_host(count, timeout))
    }

    /// Run an async operation synchronously.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.runtime.block_on(future)
    }
}
