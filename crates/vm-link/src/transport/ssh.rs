//! SSH transport built on russh.
//!
//! Authentication is public key only. Each command runs on its own session
//! channel; a pump task routes the channel's messages into two in-memory pipes
//! and a oneshot carrying the exit status.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

use super::{Connector, EXIT_STATUS_UNKNOWN, RemoteProcess, Transport};
use crate::config::{HostKeyPolicy, SessionConfig};
use crate::error::TransportError;

/// Capacity of each output pipe between the pump task and its reader.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Opens [`SshTransport`]s.
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::with_config(client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        })
    }
}

impl SshConnector {
    /// A connector with keepalives every 30 seconds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector with custom russh client settings.
    #[must_use]
    pub fn with_config(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn establish(
        &self,
        config: &SessionConfig,
        key: Arc<PrivateKey>,
    ) -> Result<Handle<ClientHandler>, TransportError> {
        let handler = ClientHandler {
            host: config.host.clone(),
            port: config.port,
            policy: config.host_key_policy,
        };

        let mut handle = client::connect(
            Arc::clone(&self.config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => TransportError::HostKeyVerification {
                host: config.host.clone(),
                reason: "server host key was rejected".to_string(),
            },
            other => TransportError::Connection {
                host: config.host.clone(),
                port: config.port,
                reason: other.to_string(),
            },
        })?;

        // Result<Option<Option<HashAlg>>>; anything but a concrete choice means default.
        let rsa_hash = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth = handle
            .authenticate_publickey(&config.username, PrivateKeyWithHashAlg::new(key, rsa_hash))
            .await
            .map_err(|e| TransportError::Authentication {
                user: config.username.clone(),
                reason: e.to_string(),
            })?;

        if !auth.success() {
            return Err(TransportError::Authentication {
                user: config.username.clone(),
                reason: "public key was not accepted".to_string(),
            });
        }

        tracing::debug!(host = %config.host, user = %config.username, "Public key authentication successful");
        Ok(handle)
    }
}

impl Connector for SshConnector {
    type Key = Arc<PrivateKey>;
    type Transport = SshTransport;

    async fn load_key(&self, path: &Path) -> Result<Arc<PrivateKey>, TransportError> {
        let key_error = |reason: String| TransportError::Key {
            path: path.display().to_string(),
            reason,
        };
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| key_error(e.to_string()))?;
        let key = russh::keys::decode_secret_key(&text, None).map_err(|e| key_error(e.to_string()))?;
        Ok(Arc::new(key))
    }

    async fn open(
        &self,
        config: &SessionConfig,
        key: Arc<PrivateKey>,
    ) -> Result<SshTransport, TransportError> {
        let handle = tokio::time::timeout(config.connect_timeout, self.establish(config, key))
            .await
            .map_err(|_| TransportError::Timeout {
                duration: config.connect_timeout,
            })??;

        Ok(SshTransport {
            handle,
            host: config.host.clone(),
        })
    }
}

/// Host key verification against `~/.ssh/known_hosts`.
#[derive(Debug)]
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        match russh::keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => {
                tracing::debug!(host = %self.host, "Host key verified against known_hosts");
                Ok(true)
            }
            Ok(false) => match self.policy {
                HostKeyPolicy::KnownHosts => {
                    tracing::warn!(host = %self.host, "Host not found in known_hosts file");
                    Ok(false)
                }
                HostKeyPolicy::AcceptNew => {
                    match russh::keys::known_hosts::learn_known_hosts(
                        &self.host,
                        self.port,
                        server_public_key,
                    ) {
                        Ok(()) => tracing::info!(host = %self.host, "Added host key to known_hosts"),
                        Err(e) => tracing::warn!(
                            host = %self.host,
                            error = %e,
                            "Failed to record host key, accepting it for this connection"
                        ),
                    }
                    Ok(true)
                }
            },
            Err(russh::keys::Error::KeyChanged { line }) => {
                tracing::error!(
                    host = %self.host,
                    line,
                    "HOST KEY MISMATCH! Possible man-in-the-middle attack!"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "Failed to check known_hosts");
                Ok(false)
            }
        }
    }
}

/// An authenticated SSH connection.
pub struct SshTransport {
    handle: Handle<ClientHandler>,
    host: String,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("host", &self.host)
            .field("closed", &self.handle.is_closed())
            .finish()
    }
}

impl Transport for SshTransport {
    fn is_active(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn execute(&mut self, command: &str) -> Result<RemoteProcess, TransportError> {
        if self.handle.is_closed() {
            return Err(TransportError::Closed);
        }

        let channel_error = |e: russh::Error| TransportError::Channel {
            reason: e.to_string(),
        };
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(channel_error)?;
        channel.exec(true, command).await.map_err(channel_error)?;
        // Commands never read stdin.
        channel.eof().await.map_err(channel_error)?;

        let (stdout_tx, stdout_rx) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_tx, stderr_rx) = tokio::io::duplex(PIPE_CAPACITY);
        let (status_tx, status_rx) = oneshot::channel();
        tokio::spawn(pump(channel, stdout_tx, stderr_tx, status_tx));

        Ok(RemoteProcess::new(stdout_rx, stderr_rx, status_rx))
    }

    async fn close(&mut self) {
        if self.handle.is_closed() {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(host = %self.host, error = %e, "Error while disconnecting");
        }
    }
}

/// Route channel messages until the channel closes.
///
/// Dropping a pipe's writer is what signals end of stream to its reader.
async fn pump(
    mut channel: Channel<Msg>,
    stdout: DuplexStream,
    stderr: DuplexStream,
    status: oneshot::Sender<i32>,
) {
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);
    let mut status = Some(status);

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => forward(&mut stdout, &data).await,
            ChannelMsg::ExtendedData { data, ext: 1 } => forward(&mut stderr, &data).await,
            ChannelMsg::ExitStatus { exit_status } => {
                if let Some(tx) = status.take() {
                    let _ = tx.send(i32::try_from(exit_status).unwrap_or(EXIT_STATUS_UNKNOWN));
                }
            }
            ChannelMsg::Eof => {
                stdout = None;
                stderr = None;
            }
            ChannelMsg::Close => break,
            _ => {}
        }
    }
}

async fn forward(pipe: &mut Option<DuplexStream>, data: &[u8]) {
    if let Some(writer) = pipe.as_mut() {
        if writer.write_all(data).await.is_err() {
            // Reader is gone; discard the rest of this stream.
            *pipe = None;
        }
    }
}
