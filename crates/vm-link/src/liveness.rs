//! Host liveness checks.
//!
//! The primary check reads the boot time over SSH and runs reboot detection.
//! If that fails for any reason, an ICMP echo probe decides whether the host
//! is at least reachable on the network.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use crate::config::LivenessConfig;
use crate::error::{LinkError, Result};
use crate::exec::CommandExecutor;
use crate::reboot::RebootDetector;
use crate::session::Session;
use crate::transport::Transport;

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// SSH works and the boot time is consistent.
    Healthy,
    /// The SSH check failed but the host answers echo requests.
    Degraded,
}

impl HealthStatus {
    /// Check if healthy.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// A network-level reachability probe.
pub trait EchoProbe: Send + Sync {
    /// Send `count` echo requests to `host`, each waiting up to `timeout`.
    /// Any failure to run the probe counts as unreachable.
    fn probe(&self, host: &str, count: u32, timeout: Duration) -> impl Future<Output = bool> + Send;
}

/// Runs the system `ping` program.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl PingProbe {
    /// Use `ping` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(crate::config::DEFAULT_PING_PROGRAM)
    }

    /// Use another program taking the same arguments.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl EchoProbe for PingProbe {
    async fn probe(&self, host: &str, count: u32, timeout: Duration) -> bool {
        let wait = timeout.max(Duration::from_secs(1));
        let wait_secs = wait.as_secs();
        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("-c")
            .arg(count.to_string())
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let limit = wait.saturating_mul(count).saturating_add(wait);
        match tokio::time::timeout(limit, command.status()).await {
            Ok(Ok(status)) => {
                tracing::debug!(host, %status, "Ping finished");
                status.success()
            }
            Ok(Err(e)) => {
                tracing::warn!(host, program = %self.program, error = %e, "Failed to run ping");
                false
            }
            Err(_) => {
                tracing::debug!(host, ?limit, "Ping did not finish in time");
                false
            }
        }
    }
}

/// Answers "is the host reachable and consistent".
#[derive(Debug, Clone)]
pub struct LivenessChecker<P = PingProbe> {
    config: LivenessConfig,
    probe: P,
}

impl LivenessChecker {
    /// Create a checker using `ping` as configured.
    #[must_use]
    pub fn new(config: LivenessConfig) -> Self {
        let probe = PingProbe::with_program(config.ping_program.clone());
        Self { config, probe }
    }
}

impl<P: EchoProbe> LivenessChecker<P> {
    /// Create a checker with a custom probe.
    #[must_use]
    pub const fn with_probe(config: LivenessConfig, probe: P) -> Self {
        Self { config, probe }
    }

    /// Get configuration.
    #[must_use]
    pub const fn config(&self) -> &LivenessConfig {
        &self.config
    }

    /// Run the echo probe against `host`.
    pub async fn ping_host(&self, host: &str, count: u32, timeout: Duration) -> bool {
        self.probe.probe(host, count, timeout).await
    }

    /// Check the host over SSH, falling back to the echo probe.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] when neither check succeeds.
    pub async fn check_health<T: Transport>(
        &self,
        session: &mut Session<T>,
        executor: &CommandExecutor,
        detector: &RebootDetector,
    ) -> Result<HealthStatus> {
        let ssh_check = match detector.boot_time(executor, session).await {
            Ok(current) => detector.check_for_reboot(session, current),
            Err(e) => Err(e),
        };

        let Err(e) = ssh_check else {
            return Ok(HealthStatus::Healthy);
        };

        let host = session.host().to_string();
        tracing::warn!(%host, error = %e, "SSH boot time check failed, trying ping");

        if self
            .ping_host(&host, self.config.ping_count, self.config.ping_timeout)
            .await
        {
            tracing::warn!(%host, "Host answers ping but SSH check failed");
            Ok(HealthStatus::Degraded)
        } else {
            Err(LinkError::connection_failed(
                host,
                "host is not reachable via SSH or ping",
            ))
        }
    }

    /// Whether the host is reachable by either check.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionFailed`] when neither check succeeds.
    pub async fn is_alive<T: Transport>(
        &self,
        session: &mut Session<T>,
        executor: &CommandExecutor,
        detector: &RebootDetector,
    ) -> Result<bool> {
        self.check_health(session, executor, detector)
            .await
            .map(|_| true)
    }
}
