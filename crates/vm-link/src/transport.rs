//! Transport abstraction.
//!
//! A [`Connector`] turns a [`SessionConfig`] plus key material into a live
//! [`Transport`]; a transport starts remote commands and hands back their two
//! output streams and a pending exit status as a [`RemoteProcess`].
//!
//! Implementations:
//! - [`ssh`]: russh-backed SSH client (feature `ssh`)
//! - [`mock`]: scripted in-memory transport for tests (feature `mock`)

use std::future::Future;
use std::path::Path;

use tokio::io::AsyncRead;
use tokio::sync::oneshot;

use crate::config::SessionConfig;
use crate::error::TransportError;

#[cfg(feature = "mock")]
pub mod mock;
#[cfg(feature = "ssh")]
pub mod ssh;

/// Exit code reported when the channel closed without an exit status.
pub const EXIT_STATUS_UNKNOWN: i32 = -1;

/// One output stream of a remote command.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens transports to a host.
pub trait Connector: Send + Sync {
    /// Loaded private key material.
    type Key: Send;

    /// The transport type produced by this connector.
    type Transport: Transport;

    /// Load the private key at `path`.
    fn load_key(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::Key, TransportError>> + Send;

    /// Connect and authenticate as `config.username` within
    /// `config.connect_timeout`.
    fn open(
        &self,
        config: &SessionConfig,
        key: Self::Key,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

/// A live, authenticated connection able to run commands.
pub trait Transport: Send {
    /// Whether the transport still believes the connection is up.
    fn is_active(&self) -> bool;

    /// Start `command` on the remote side.
    fn execute(
        &mut self,
        command: &str,
    ) -> impl Future<Output = Result<RemoteProcess, TransportError>> + Send;

    /// Close the connection. Closing twice is harmless.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// A command started on the remote side.
pub struct RemoteProcess {
    stdout: OutputStream,
    stderr: OutputStream,
    exit_status: ExitStatus,
}

impl std::fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("exit_status", &self.exit_status)
            .finish_non_exhaustive()
    }
}

impl RemoteProcess {
    /// Bundle the streams of a started command.
    ///
    /// `exit_status` must only resolve once the command has terminated; a
    /// dropped sender means the status was never reported.
    pub fn new(
        stdout: impl AsyncRead + Send + Unpin + 'static,
        stderr: impl AsyncRead + Send + Unpin + 'static,
        exit_status: oneshot::Receiver<i32>,
    ) -> Self {
        Self {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit_status: ExitStatus(exit_status),
        }
    }

    /// Split into stdout, stderr and the pending exit status.
    #[must_use]
    pub fn into_parts(self) -> (OutputStream, OutputStream, ExitStatus) {
        (self.stdout, self.stderr, self.exit_status)
    }
}

/// The pending exit status of a remote command.
#[derive(Debug)]
pub struct ExitStatus(oneshot::Receiver<i32>);

impl ExitStatus {
    /// Wait for the status; [`EXIT_STATUS_UNKNOWN`] if none was reported.
    pub async fn wait(self) -> i32 {
        self.0.await.unwrap_or(EXIT_STATUS_UNKNOWN)
    }
}
