//! Configuration types for vm-link.
//!
//! [`LinkConfig`] groups everything one [`ConnectionManager`] needs: the
//! remote endpoint, command execution timing, reboot detection, the liveness
//! fallback and the reconnect policy. Values come from defaults, optionally
//! overlaid by a TOML file ([`file`]) and `VMLINK_*` environment variables
//! ([`env`]).
//!
//! [`ConnectionManager`]: crate::connection::ConnectionManager

pub mod env;
pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{LinkError, Result};

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wall-clock window for one command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on a single dequeue attempt in the drain loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time given to stream readers after the drain loop stops.
pub const DEFAULT_READER_GRACE: Duration = Duration::from_secs(2);

/// Command used to read the host's uptime in whole seconds.
pub const DEFAULT_BOOT_TIME_COMMAND: &str = "cut -f1 -d. /proc/uptime";

/// Default timeout for the uptime command.
pub const DEFAULT_BOOT_TIME_TIMEOUT: Duration = Duration::from_secs(5);

/// Boot time drift tolerated before a reboot is reported.
pub const DEFAULT_REBOOT_TOLERANCE: Duration = Duration::from_secs(5);

/// Default number of echo requests sent by the liveness fallback.
pub const DEFAULT_PING_COUNT: u32 = 1;

/// Default echo probe timeout.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Default echo probe program.
pub const DEFAULT_PING_PROGRAM: &str = "ping";

/// Default number of reconnect attempts.
pub const DEFAULT_RECONNECT_RETRIES: u32 = 3;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// How the SSH transport treats the server's host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept keys for unknown hosts and record them in `known_hosts`;
    /// reject keys that differ from a recorded one.
    #[default]
    AcceptNew,
    /// Only accept keys already present in `known_hosts`.
    KnownHosts,
}

/// The remote endpoint and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Host name or address.
    pub host: String,
    /// Remote user.
    pub username: String,
    /// Private key used for public key authentication.
    pub key_path: PathBuf,
    /// Port (default 22).
    pub port: u16,
    /// Connection timeout.
    #[serde(deserialize_with = "secs::deserialize")]
    pub connect_timeout: Duration,
    /// Host key verification policy.
    pub host_key_policy: HostKeyPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let key_path = env::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ssh")
            .join("id_rsa");

        Self {
            host: String::new(),
            username: env::current_user().unwrap_or_else(|| "root".to_string()),
            key_path,
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Create new config for a host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the private key path.
    #[must_use]
    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = path.into();
        self
    }

    /// Set connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set host key policy.
    #[must_use]
    pub const fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Get the address string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timing of command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    /// Wall-clock window for commands run without an explicit timeout.
    #[serde(deserialize_with = "secs::deserialize")]
    pub command_timeout: Duration,
    /// Bound on one dequeue attempt; the deadline is re-checked at this rate
    /// even when no output arrives.
    #[serde(deserialize_with = "secs::deserialize")]
    pub poll_interval: Duration,
    /// How long stream readers may keep running after draining stops before
    /// they are abandoned.
    #[serde(deserialize_with = "secs::deserialize")]
    pub reader_grace: Duration,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reader_grace: DEFAULT_READER_GRACE,
        }
    }
}

impl ExecConfig {
    /// Set the default command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the drain loop polling interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the reader grace period.
    #[must_use]
    pub const fn reader_grace(mut self, grace: Duration) -> Self {
        self.reader_grace = grace;
        self
    }
}

/// Boot time introspection and reboot detection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RebootConfig {
    /// Command printing the uptime in seconds on its first stdout line.
    pub command: String,
    /// Timeout for that command.
    #[serde(deserialize_with = "secs::deserialize")]
    pub timeout: Duration,
    /// Largest boot time drift that is not treated as a reboot.
    #[serde(deserialize_with = "secs::deserialize")]
    pub tolerance: Duration,
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_BOOT_TIME_COMMAND.to_string(),
            timeout: DEFAULT_BOOT_TIME_TIMEOUT,
            tolerance: DEFAULT_REBOOT_TOLERANCE,
        }
    }
}

impl RebootConfig {
    /// Set the tolerance.
    #[must_use]
    pub const fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the uptime command timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The echo probe used when the SSH-level check fails.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LivenessConfig {
    /// Number of echo requests.
    pub ping_count: u32,
    /// Probe timeout.
    #[serde(deserialize_with = "secs::deserialize")]
    pub ping_timeout: Duration,
    /// Probe program; invoked as `<program> -c <count> -W <secs> <host>`.
    pub ping_program: String,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_count: DEFAULT_PING_COUNT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            ping_program: DEFAULT_PING_PROGRAM.to_string(),
        }
    }
}

/// Reconnect policy used by [`ConnectionManager::reconnect_default`].
///
/// [`ConnectionManager::reconnect_default`]: crate::connection::ConnectionManager::reconnect_default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Connect attempts before giving up.
    pub retries: u32,
    /// Pause between attempts.
    #[serde(deserialize_with = "secs::deserialize")]
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RECONNECT_RETRIES,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Complete configuration for one remote host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Remote endpoint.
    pub session: SessionConfig,
    /// Command execution timing.
    pub exec: ExecConfig,
    /// Reboot detection.
    pub reboot: RebootConfig,
    /// Liveness fallback.
    pub liveness: LivenessConfig,
    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
}

impl LinkConfig {
    /// Create a configuration for `host` with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            session: SessionConfig::new(host),
            ..Default::default()
        }
    }

    /// Replace the session section.
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Replace the exec section.
    #[must_use]
    pub const fn with_exec(mut self, exec: ExecConfig) -> Self {
        self.exec = exec;
        self
    }

    /// Replace the reboot section.
    #[must_use]
    pub fn with_reboot(mut self, reboot: RebootConfig) -> Self {
        self.reboot = reboot;
        self
    }

    /// Replace the liveness section.
    #[must_use]
    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    /// Replace the reconnect section.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Check the values for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.session.host.trim().is_empty() {
            return Err(LinkError::config("session.host must not be empty"));
        }
        if self.session.username.is_empty() {
            return Err(LinkError::config("session.username must not be empty"));
        }
        if self.exec.poll_interval.is_zero() {
            return Err(LinkError::config("exec.poll_interval must be positive"));
        }
        if self.reboot.command.trim().is_empty() {
            return Err(LinkError::config("reboot.command must not be empty"));
        }
        if self.liveness.ping_count == 0 {
            return Err(LinkError::config("liveness.ping_count must be at least 1"));
        }
        Ok(())
    }
}

/// Durations written as (possibly fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de::Error};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}
