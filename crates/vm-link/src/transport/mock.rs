//! Scripted in-memory transport.
//!
//! [`MockConnector`] hands out [`MockTransport`]s that answer commands from a
//! script shared between the connector and every transport it opened, so a
//! test can keep a connector clone, hand another to a
//! [`ConnectionManager`](crate::connection::ConnectionManager), and change or
//! inspect the remote side while the manager runs.
//!
//! ```
//! use std::time::Duration;
//! use vm_link::transport::mock::{MockCommand, MockConnector};
//!
//! let connector = MockConnector::new().with_uptime(Duration::from_secs(3600));
//! connector.respond("hostname", MockCommand::new().stdout("vm-01\n"));
//! connector.respond("false", MockCommand::new().exit_code(1));
//! ```

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::oneshot;

use super::{Connector, RemoteProcess, Transport};
use crate::config::{DEFAULT_BOOT_TIME_COMMAND, SessionConfig};
use crate::error::TransportError;

/// Scripted behavior of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCommand {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    hang: bool,
}

impl Default for MockCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommand {
    /// A command that prints nothing and exits 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: Some(0),
            hang: false,
        }
    }

    /// Append to stdout.
    #[must_use]
    pub fn stdout(mut self, text: impl AsRef<[u8]>) -> Self {
        self.stdout.extend_from_slice(text.as_ref());
        self
    }

    /// Append to stderr.
    #[must_use]
    pub fn stderr(mut self, text: impl AsRef<[u8]>) -> Self {
        self.stderr.extend_from_slice(text.as_ref());
        self
    }

    /// Set the exit code.
    #[must_use]
    pub const fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Close the channel without reporting an exit status.
    #[must_use]
    pub const fn without_exit_status(mut self) -> Self {
        self.exit_code = None;
        self
    }

    /// Print the configured output, then never close the streams or exit.
    #[must_use]
    pub const fn hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

/// Pipes and status senders of hung commands, kept open until the state drops.
type HeldOpen = (DuplexStream, DuplexStream, oneshot::Sender<i32>);

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, VecDeque<MockCommand>>,
    executed: Vec<String>,
    connect_attempts: u32,
    failures_left: u32,
    failure_reason: String,
    links: Vec<Arc<AtomicBool>>,
    held: Vec<HeldOpen>,
}

impl MockState {
    fn next_response(&mut self, command: &str) -> MockCommand {
        match self.responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => MockCommand::new()
                .stderr(format!("{command}: command not found\n"))
                .exit_code(127),
        }
    }
}

/// Opens [`MockTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// A connector whose hosts know no commands.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer the uptime command with `uptime`.
    #[must_use]
    pub fn with_uptime(self, uptime: Duration) -> Self {
        self.set_uptime(uptime);
        self
    }

    /// Change the uptime reported from now on.
    pub fn set_uptime(&self, uptime: Duration) {
        self.set_response(
            DEFAULT_BOOT_TIME_COMMAND,
            MockCommand::new().stdout(format!("{}\n", uptime.as_secs())),
        );
    }

    /// Answer `command` with `response` from now on, dropping queued ones.
    pub fn set_response(&self, command: impl Into<String>, response: MockCommand) {
        self.lock()
            .responses
            .insert(command.into(), VecDeque::from([response]));
    }

    /// Queue a response for `command`. Responses are used in order; the last
    /// one keeps answering.
    pub fn respond(&self, command: impl Into<String>, response: MockCommand) {
        self.lock()
            .responses
            .entry(command.into())
            .or_default()
            .push_back(response);
    }

    /// Make the next `count` connection attempts fail with `reason`.
    pub fn fail_connects(&self, count: u32, reason: impl Into<String>) {
        let mut state = self.lock();
        state.failures_left = count;
        state.failure_reason = reason.into();
    }

    /// Connection attempts so far, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Every command executed so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Transports opened and not yet closed or dropped by the remote side.
    #[must_use]
    pub fn active_transports(&self) -> usize {
        self.lock()
            .links
            .iter()
            .filter(|link| link.load(Ordering::SeqCst))
            .count()
    }

    /// Simulate the remote side dropping every open connection.
    pub fn drop_connections(&self) {
        for link in &self.lock().links {
            link.store(false, Ordering::SeqCst);
        }
    }
}

impl Connector for MockConnector {
    type Key = PathBuf;
    type Transport = MockTransport;

    async fn load_key(&self, path: &Path) -> Result<PathBuf, TransportError> {
        Ok(path.to_path_buf())
    }

    async fn open(
        &self,
        config: &SessionConfig,
        _key: PathBuf,
    ) -> Result<MockTransport, TransportError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(TransportError::Connection {
                host: config.host.clone(),
                port: config.port,
                reason: state.failure_reason.clone(),
            });
        }

        let active = Arc::new(AtomicBool::new(true));
        state.links.push(Arc::clone(&active));
        Ok(MockTransport {
            state: Arc::clone(&self.state),
            active,
        })
    }
}

/// One scripted connection.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    active: Arc<AtomicBool>,
}

impl MockTransport {
    fn start(&self, command: &str) -> Result<RemoteProcess, TransportError> {
        if !self.is_active() {
            return Err(TransportError::Closed);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.executed.push(command.to_string());
        let response = state.next_response(command);
        let (tx, rx) = oneshot::channel();

        if response.hang {
            let (out_writer, out_reader) = tokio::io::duplex(64);
            let (err_writer, err_reader) = tokio::io::duplex(64);
            state.held.push((out_writer, err_writer, tx));
            return Ok(RemoteProcess::new(
                Cursor::new(response.stdout).chain(out_reader),
                Cursor::new(response.stderr).chain(err_reader),
                rx,
            ));
        }

        if let Some(code) = response.exit_code {
            let _ = tx.send(code);
        }
        Ok(RemoteProcess::new(
            Cursor::new(response.stdout),
            Cursor::new(response.stderr),
            rx,
        ))
    }
}

impl Transport for MockTransport {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn execute(&mut self, command: &str) -> Result<RemoteProcess, TransportError> {
        self.start(command)
    }

    async fn close(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(connector: &MockConnector) -> MockTransport {
        connector
            .open(&SessionConfig::new("vm-01"), PathBuf::new())
            .await
            .unwrap()
    }

    async fn read_all(process: RemoteProcess) -> (String, String, i32) {
        let (mut stdout, mut stderr, status) = process.into_parts();
        let mut out = String::new();
        let mut err = String::new();
        stdout.read_to_string(&mut out).await.unwrap();
        stderr.read_to_string(&mut err).await.unwrap();
        (out, err, status.wait().await)
    }

    #[tokio::test]
    async fn last_response_is_sticky() {
        let connector = MockConnector::new();
        connector.respond("n", MockCommand::new().stdout("1\n"));
        connector.respond("n", MockCommand::new().stdout("2\n"));
        let mut transport = open(&connector).await;

        let mut seen = Vec::new();
        for _ in 0..3 {
            let (out, _, _) = read_all(transport.execute("n").await.unwrap()).await;
            seen.push(out);
        }
        assert_eq!(seen, ["1\n", "2\n", "2\n"]);
        assert_eq!(connector.executed(), ["n", "n", "n"]);
    }

    #[tokio::test]
    async fn unknown_command_exits_127() {
        let connector = MockConnector::new();
        let mut transport = open(&connector).await;
        let (out, err, code) = read_all(transport.execute("frobnicate").await.unwrap()).await;
        assert!(out.is_empty());
        assert!(err.contains("command not found"));
        assert_eq!(code, 127);
    }

    #[tokio::test]
    async fn failures_are_counted_down() {
        let connector = MockConnector::new();
        connector.fail_connects(2, "refused");
        let config = SessionConfig::new("vm-01");

        assert!(connector.open(&config, PathBuf::new()).await.is_err());
        assert!(connector.open(&config, PathBuf::new()).await.is_err());
        assert!(connector.open(&config, PathBuf::new()).await.is_ok());
        assert_eq!(connector.connect_attempts(), 3);
        assert_eq!(connector.active_transports(), 1);
    }

    #[tokio::test]
    async fn dropped_connection_refuses_commands() {
        let connector = MockConnector::new();
        let mut transport = open(&connector).await;
        connector.drop_connections();

        assert!(!transport.is_active());
        assert!(matches!(
            transport.execute("true").await,
            Err(TransportError::Closed)
        ));
    }
}
