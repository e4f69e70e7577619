//! Convenient re-exports for common vm-link usage.
//!
//! ```
//! use vm_link::prelude::*;
//! ```

// Configuration
pub use crate::config::{LinkConfig, SessionConfig};

// Error handling
pub use crate::error::{LinkError, Result};

// Connection and its components
pub use crate::connection::ConnectionManager;
pub use crate::exec::ExecutionResult;
pub use crate::liveness::HealthStatus;
pub use crate::reboot::BootTime;
pub use crate::retry::RetryStrategy;
pub use crate::sync::BlockingConnection;

// Transports
#[cfg(feature = "mock")]
pub use crate::transport::mock::{MockCommand, MockConnector};
#[cfg(feature = "ssh")]
pub use crate::transport::ssh::SshConnector;
pub use crate::transport::{Connector, Transport};
