//! Remote command execution.
//!
//! [`CommandExecutor::execute`] starts a command on the session's transport,
//! reads stdout and stderr concurrently through a [`StreamMultiplexer`] and
//! hands every line to a callback as it arrives. The whole run, including
//! starting the command and collecting the exit status, is bounded by one
//! wall-clock window.

pub mod multiplexer;

use std::time::Duration;

use crate::config::ExecConfig;
use crate::error::{LinkError, Result};
use crate::session::Session;
use crate::transport::Transport;
use crate::util::Deadline;

use multiplexer::{Dequeue, Payload, StreamMultiplexer, StreamTag, format_line};

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    exit_code: i32,
    stdout_lines: usize,
    stderr_lines: usize,
    elapsed: Duration,
}

impl ExecutionResult {
    /// Exit code; `-1` if the remote side never reported one.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Whether the exit code is zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Lines delivered from stdout.
    #[must_use]
    pub const fn stdout_lines(&self) -> usize {
        self.stdout_lines
    }

    /// Lines delivered from stderr.
    #[must_use]
    pub const fn stderr_lines(&self) -> usize {
        self.stderr_lines
    }

    /// Time from start to exit status.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Runs commands over a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: ExecConfig,
}

impl CommandExecutor {
    /// Create an executor.
    #[must_use]
    pub const fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    /// Get configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Run `command`, calling `on_line` with every formatted output line.
    ///
    /// Lines are passed as `[stdout]: text` or `[stderr]: text`, in arrival
    /// order. `timeout` defaults to the configured command timeout. When the
    /// window closes the call fails with [`LinkError::CommandTimeout`]; the
    /// remote process is left running.
    pub async fn execute<T, F>(
        &self,
        session: &mut Session<T>,
        command: &str,
        timeout: Option<Duration>,
        mut on_line: F,
    ) -> Result<ExecutionResult>
    where
        T: Transport,
        F: FnMut(&str),
    {
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        let host = session.host().to_string();
        let transport = session.transport_mut()?;
        let deadline = Deadline::from_now(timeout);

        tracing::debug!(%host, command, ?timeout, "Executing command");

        let process = match tokio::time::timeout(deadline.remaining(), transport.execute(command)).await {
            Ok(Ok(process)) => process,
            Ok(Err(e)) => return Err(LinkError::connection_failed(host, e)),
            Err(_) => return Err(LinkError::command_timeout(command, timeout)),
        };
        let (stdout, stderr, exit_status) = process.into_parts();
        let mut mux = StreamMultiplexer::start(stdout, stderr);

        let mut stdout_lines = 0;
        let mut stderr_lines = 0;
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            if deadline.is_expired() {
                mux.finish(self.config.reader_grace).await;
                tracing::warn!(%host, command, ?timeout, "Command timed out");
                return Err(LinkError::command_timeout(command, timeout));
            }

            let poll = self.config.poll_interval.min(deadline.remaining());
            match mux.next(poll).await {
                Dequeue::Record(record) => match record.payload {
                    Payload::Line(line) => {
                        match record.stream {
                            StreamTag::Stdout => stdout_lines += 1,
                            StreamTag::Stderr => stderr_lines += 1,
                        }
                        on_line(&format_line(record.stream, &line));
                    }
                    Payload::EndOfStream => match record.stream {
                        StreamTag::Stdout => stdout_done = true,
                        StreamTag::Stderr => stderr_done = true,
                    },
                },
                Dequeue::Idle => {}
                Dequeue::Closed => break,
            }
        }

        mux.finish(self.config.reader_grace).await;

        let wait = deadline.remaining().max(self.config.poll_interval);
        let Ok(exit_code) = tokio::time::timeout(wait, exit_status.wait()).await else {
            tracing::warn!(%host, command, "Exit status not reported in time");
            return Err(LinkError::command_timeout(command, timeout));
        };

        let result = ExecutionResult {
            exit_code,
            stdout_lines,
            stderr_lines,
            elapsed: deadline.elapsed(),
        };
        tracing::debug!(
            %host,
            command,
            exit_code,
            stdout_lines,
            stderr_lines,
            elapsed = ?result.elapsed,
            "Command finished"
        );
        Ok(result)
    }

    /// Like [`execute`](Self::execute), also returning every formatted line.
    pub async fn execute_collect<T: Transport>(
        &self,
        session: &mut Session<T>,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<(ExecutionResult, Vec<String>)> {
        let mut lines = Vec::new();
        let result = self
            .execute(session, command, timeout, |line| lines.push(line.to_string()))
            .await?;
        Ok((result, lines))
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::transport::mock::{MockCommand, MockConnector};
    use crate::transport::Connector;

    async fn session_with(connector: &MockConnector) -> Session<crate::transport::mock::MockTransport> {
        let config = SessionConfig::new("vm-01");
        let key = connector.load_key(&config.key_path).await.unwrap();
        let transport = connector.open(&config, key).await.unwrap();
        let mut session = Session::new(config);
        session.attach(transport);
        session
    }

    #[tokio::test]
    async fn counts_lines_per_stream() {
        let connector = MockConnector::new();
        connector.respond(
            "build",
            MockCommand::new().stdout("a\nb\n").stderr("warn\n").exit_code(2),
        );
        let mut session = session_with(&connector).await;

        let (result, lines) = CommandExecutor::default()
            .execute_collect(&mut session, "build", None)
            .await
            .unwrap();

        assert_eq!(result.exit_code(), 2);
        assert!(!result.success());
        assert_eq!(result.stdout_lines(), 2);
        assert_eq!(result.stderr_lines(), 1);
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(&"[stderr]: warn".to_string()));
    }

    #[tokio::test]
    async fn transport_error_becomes_connection_failed() {
        let connector = MockConnector::new();
        let mut session = session_with(&connector).await;
        connector.drop_connections();

        let err = CommandExecutor::default()
            .execute(&mut session, "true", None, |_| {})
            .await
            .unwrap_err();
        assert!(err.is_connection_failed());
    }
}
