//! Connection lifecycle and the public facade.
//!
//! A [`ConnectionManager`] owns one [`Session`] and the components that work
//! on it. Each remote host gets its own manager; commands on one manager run
//! one at a time because every operation takes `&mut self`.

use std::fmt;
use std::time::Duration;

use crate::config::{LinkConfig, ReconnectConfig};
use crate::error::{LinkError, Result};
use crate::exec::{CommandExecutor, ExecutionResult};
use crate::liveness::{EchoProbe, HealthStatus, LivenessChecker, PingProbe};
use crate::reboot::{BootTime, RebootDetector};
use crate::retry::RetryStrategy;
use crate::session::Session;
use crate::transport::{Connector, Transport};

/// Owns the session to one host.
pub struct ConnectionManager<C: Connector, P = PingProbe> {
    config: LinkConfig,
    connector: C,
    session: Session<C::Transport>,
    executor: CommandExecutor,
    detector: RebootDetector,
    liveness: LivenessChecker<P>,
}

impl<C: Connector, P> fmt::Debug for ConnectionManager<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a disconnected manager using `ping` for the liveness fallback.
    #[must_use]
    pub fn new(config: LinkConfig, connector: C) -> Self {
        let liveness = LivenessChecker::new(config.liveness.clone());
        Self::assemble(config, connector, liveness)
    }
}

impl<C: Connector, P: EchoProbe> ConnectionManager<C, P> {
    /// Create a disconnected manager with a custom echo probe.
    #[must_use]
    pub fn with_probe(config: LinkConfig, connector: C, probe: P) -> Self {
        let liveness = LivenessChecker::with_probe(config.liveness.clone(), probe);
        Self::assemble(config, connector, liveness)
    }

    fn assemble(config: LinkConfig, connector: C, liveness: LivenessChecker<P>) -> Self {
        Self {
            session: Session::new(config.session.clone()),
            executor: CommandExecutor::new(config.exec),
            detector: RebootDetector::new(config.reboot.clone()),
            liveness,
            connector,
            config,
        }
    }

    /// Get configuration.
    #[must_use]
    pub const fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The session.
    #[must_use]
    pub const fn session(&self) -> &Session<C::Transport> {
        &self.session
    }

    /// The connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Whether a transport is held and reports itself active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_active()
    }

    /// Connect and record the baseline boot time.
    ///
    /// An existing transport is replaced. If the boot time cannot be read the
    /// new transport is closed again and the session stays disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] if the key cannot be loaded or
    /// the transport cannot be opened, or the boot time error.
    pub async fn connect(&mut self) -> Result<()> {
        let config = self.session.config().clone();
        tracing::debug!(
            host = %config.host,
            port = config.port,
            user = %config.username,
            key = %config.key_path.display(),
            "Connecting"
        );

        let key = self
            .connector
            .load_key(&config.key_path)
            .await
            .map_err(|e| LinkError::connection_failed(&config.host, e))?;
        let transport = self
            .connector
            .open(&config, key)
            .await
            .map_err(|e| LinkError::connection_failed(&config.host, e))?;

        if let Some(mut previous) = self.session.attach(transport) {
            previous.close().await;
        }

        match self.detector.boot_time(&self.executor, &mut self.session).await {
            Ok(boot_time) => {
                self.session.set_last_boot_time(Some(boot_time));
                tracing::info!(host = %config.host, %boot_time, "Connected");
                Ok(())
            }
            Err(e) => {
                if let Some(mut transport) = self.session.take_transport() {
                    transport.close().await;
                }
                self.session.set_last_boot_time(None);
                tracing::debug!(host = %config.host, error = %e, "Connected but boot time is unreadable");
                Err(e)
            }
        }
    }

    /// Reconnect with a fixed delay between attempts.
    ///
    /// Without `force`, an active connection is kept and nothing happens.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] once `retries` attempts failed.
    pub async fn reconnect(&mut self, force: bool, retries: u32, delay: Duration) -> Result<()> {
        self.reconnect_with(force, &RetryStrategy::fixed(delay, retries))
            .await
    }

    /// Reconnect using the configured attempts and delay.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] once all attempts failed.
    pub async fn reconnect_default(&mut self, force: bool) -> Result<()> {
        let ReconnectConfig { retries, delay } = self.config.reconnect;
        self.reconnect(force, retries, delay).await
    }

    /// Reconnect, pacing attempts with `strategy`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] once all attempts failed.
    pub async fn reconnect_with(&mut self, force: bool, strategy: &RetryStrategy) -> Result<()> {
        if !force && self.session.is_active() {
            tracing::debug!(host = %self.session.host(), "Connection is active; not reconnecting");
            return Ok(());
        }

        if let Some(mut transport) = self.session.take_transport() {
            transport.close().await;
        }

        let attempts = strategy.max_attempts();
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.connect().await {
                Ok(()) => {
                    tracing::info!(host = %self.session.host(), attempt = attempt + 1, "Reconnected");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        host = %self.session.host(),
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    last_error = Some(e);
                }
            }
            if let Some(delay) = strategy.delay_for_attempt(attempt) {
                tokio::time::sleep(delay).await;
            }
        }

        let reason = match last_error {
            Some(e) => format!("failed to reconnect after {attempts} attempts: {e}"),
            None => format!("failed to reconnect after {attempts} attempts"),
        };
        Err(LinkError::connection_failed(self.session.host(), reason))
    }

    /// Close the transport and forget the boot time. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if let Some(mut transport) = self.session.take_transport() {
            transport.close().await;
            tracing::info!(host = %self.session.host(), "Disconnected");
        }
        self.session.set_last_boot_time(None);
    }

    /// Run `command`, passing each formatted output line to `on_line`.
    ///
    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn execute<F: FnMut(&str)>(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
        on_line: F,
    ) -> Result<ExecutionResult> {
        self.executor
            .execute(&mut self.session, command, timeout, on_line)
            .await
    }

    /// Run `command` and collect its formatted output lines.
    ///
    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn execute_collect(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<(ExecutionResult, Vec<String>)> {
        self.executor
            .execute_collect(&mut self.session, command, timeout)
            .await
    }

    /// Read the host's current boot time.
    ///
    /// # Errors
    ///
    /// See [`RebootDetector::boot_time`].
    pub async fn boot_time(&mut self) -> Result<BootTime> {
        self.detector
            .boot_time(&self.executor, &mut self.session)
            .await
    }

    /// Compare `current` with the recorded baseline.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::UnexpectedRebootDetected`] on a jump beyond the
    /// tolerance.
    pub fn check_for_reboot(&mut self, current: BootTime) -> Result<()> {
        self.detector.check_for_reboot(&mut self.session, current)
    }

    /// Check the host over SSH with an echo probe fallback.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] when neither check succeeds.
    pub async fn check_health(&mut self) -> Result<HealthStatus> {
        self.liveness
            .check_health(&mut self.session, &self.executor, &self.detector)
            .await
    }

    /// Whether the host is reachable by either check.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] when neither check succeeds.
    pub async fn is_alive(&mut self) -> Result<bool> {
        self.liveness
            .is_alive(&mut self.session, &self.executor, &self.detector)
            .await
    }

    /// Probe the host with `count` echo requests.
    pub async fn ping_host(&self, count: u32, timeout: Duration) -> bool {
        self.liveness
            .ping_host(self.session.host(), count, timeout)
            .await
    }
}
