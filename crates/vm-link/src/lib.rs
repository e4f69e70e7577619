//! vm-link: SSH session management for remote hosts
//!
//! This crate keeps a connection to one remote host, runs shell commands on it
//! with streamed output and a wall-clock timeout, and notices when the host
//! rebooted behind your back.
//!
//! # Features
//!
//! - **Async-first design** with Tokio runtime
//! - **Concurrent stdout/stderr draining** with per-stream ordering
//! - **Reboot detection** from the host's boot time
//! - **Liveness checks** with an ICMP echo fallback
//! - **Reconnect** with fixed or exponential backoff
//! - **SSH transport** via russh (feature: `ssh`)
//! - **Mock transport** for testing (feature: `mock`)
//!
//! # Example
//!
//! ```no_run
//! use vm_link::prelude::*;
//!
//! # #[cfg(feature = "ssh")]
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = LinkConfig::new("vm-01.lab");
//!     let mut link = ConnectionManager::new(config, SshConnector::new());
//!     link.connect().await?;
//!     link.execute("uname -a", None, |line| println!("{line}")).await?;
//!     link.is_alive().await?;
//!     link.disconnect().await;
//!     Ok(())
//! }
//! # #[cfg(not(feature = "ssh"))]
//! # fn main() {}
//! ```

pub mod config;
pub mod error;
pub mod prelude;
pub mod session;
pub mod transport;
pub mod util;

pub mod connection;
pub mod exec;
pub mod liveness;
pub mod reboot;
pub mod retry;
pub mod sync;

pub use config::{
    ExecConfig, HostKeyPolicy, LinkConfig, LivenessConfig, RebootConfig, ReconnectConfig,
    SessionConfig,
};
pub use connection::ConnectionManager;
pub use error::{LinkError, Result, TransportError};
pub use exec::multiplexer::{OutputRecord, Payload, StreamMultiplexer, StreamTag};
pub use exec::{CommandExecutor, ExecutionResult};
pub use liveness::{EchoProbe, HealthStatus, LivenessChecker, PingProbe};
pub use reboot::{BootTime, RebootDetector};
pub use retry::RetryStrategy;
pub use session::Session;
pub use sync::BlockingConnection;
pub use transport::{Connector, RemoteProcess, Transport};
#[cfg(feature = "mock")]
pub use transport::mock::{MockCommand, MockConnector, MockTransport};
#[cfg(feature = "ssh")]
pub use transport::ssh::{SshConnector, SshTransport};
pub use util::Deadline;
