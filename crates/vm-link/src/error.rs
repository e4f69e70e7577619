//! Error types for vm-link.
//!
//! [`LinkError`] is what callers see. Transport implementations report the
//! narrower [`TransportError`], which the connection and execution layers wrap
//! into [`LinkError::ConnectionFailed`] together with the host name.

use std::time::Duration;

use thiserror::Error;

use crate::reboot::BootTime;

/// The main error type for vm-link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Connecting, reconnecting or reaching the host failed, or a command was
    /// attempted without a live session.
    #[error("connection to {host} failed: {reason}")]
    ConnectionFailed {
        /// The host that could not be reached.
        host: String,
        /// What went wrong.
        reason: String,
    },

    /// The command did not finish within its wall-clock window.
    ///
    /// Only the local wait was abandoned; the remote process may still run.
    #[error("command '{command}' timed out after {timeout:?}")]
    CommandTimeout {
        /// The command line that was running.
        command: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The host's boot time moved by more than the tolerance.
    #[error("unexpected reboot detected: boot time moved from {previous} to {current}")]
    UnexpectedRebootDetected {
        /// Baseline recorded before this check.
        previous: BootTime,
        /// Boot time observed now; it is also the new baseline.
        current: BootTime,
    },

    /// The boot time could not be determined.
    #[error("failed to determine boot time: {reason}")]
    BootTimeUnavailable {
        /// Why the introspection command did not yield a boot time.
        reason: String,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    Io {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP connection or handshake failed.
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connection {
        /// The host that could not be connected to.
        host: String,
        /// The port that was used.
        port: u16,
        /// The reason for the failure.
        reason: String,
    },

    /// The server rejected our credentials.
    #[error("authentication failed for user '{user}': {reason}")]
    Authentication {
        /// The user that failed to authenticate.
        user: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Host key verification failed.
    #[error("host key verification failed for {host}: {reason}")]
    HostKeyVerification {
        /// The host whose key verification failed.
        host: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The private key could not be loaded.
    #[error("failed to load private key {path}: {reason}")]
    Key {
        /// Path of the key file.
        path: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Opening or driving a channel failed.
    #[error("channel error: {reason}")]
    Channel {
        /// The reason for the channel error.
        reason: String,
    },

    /// The transport did not answer in time.
    #[error("transport operation timed out after {duration:?}")]
    Timeout {
        /// The duration that elapsed.
        duration: Duration,
    },

    /// The transport has already been closed.
    #[error("transport is closed")]
    Closed,
}

/// Result type alias for vm-link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

impl LinkError {
    /// Create a connection failure for `host`.
    pub fn connection_failed(host: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a command timeout error.
    pub fn command_timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::CommandTimeout {
            command: command.into(),
            timeout,
        }
    }

    /// Create a boot time error.
    pub fn boot_time_unavailable(reason: impl ToString) -> Self {
        Self::BootTimeUnavailable {
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this is a command timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }

    /// Check if this is a connection failure.
    #[must_use]
    pub const fn is_connection_failed(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    /// Check if this reports a detected reboot.
    #[must_use]
    pub const fn is_reboot(&self) -> bool {
        matches!(self, Self::UnexpectedRebootDetected { .. })
    }
}
