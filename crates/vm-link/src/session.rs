//! The per-host session record.

use crate::config::SessionConfig;
use crate::error::{LinkError, Result};
use crate::reboot::BootTime;
use crate::transport::Transport;

/// Identity of one remote endpoint plus its live transport and the last
/// boot time observed on it.
///
/// A present transport means the connection was believed live at the last
/// successful connect, not that it is live now; see [`Session::is_active`].
pub struct Session<T> {
    config: SessionConfig,
    transport: Option<T>,
    last_boot_time: Option<BootTime>,
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("connected", &self.transport.is_some())
            .field("last_boot_time", &self.last_boot_time)
            .finish()
    }
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session.
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
            last_boot_time: None,
        }
    }

    /// Get configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The remote host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Whether a transport is held.
    #[must_use]
    pub const fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether a transport is held and reports itself active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_active)
    }

    /// Last recorded boot time.
    #[must_use]
    pub const fn last_boot_time(&self) -> Option<BootTime> {
        self.last_boot_time
    }

    /// Record a boot time baseline.
    pub fn set_last_boot_time(&mut self, boot_time: Option<BootTime>) {
        self.last_boot_time = boot_time;
    }

    /// The transport, or `ConnectionFailed` if there is none.
    pub fn transport_mut(&mut self) -> Result<&mut T> {
        let host = &self.config.host;
        self.transport
            .as_mut()
            .ok_or_else(|| LinkError::connection_failed(host, "SSH connection is not established"))
    }

    /// Install a new transport, returning the one it replaces.
    pub fn attach(&mut self, transport: T) -> Option<T> {
        self.transport.replace(transport)
    }

    /// Remove the transport without closing it.
    pub fn take_transport(&mut self) -> Option<T> {
        self.transport.take()
    }
}
