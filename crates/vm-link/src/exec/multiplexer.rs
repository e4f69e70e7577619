//! Concurrent stdout/stderr readers feeding one queue.
//!
//! Each stream gets its own reader task. A reader pushes every line it sees,
//! then an end marker, onto a shared unbounded queue; the consumer drains the
//! queue with a bounded wait per attempt. Order is preserved within a stream,
//! never across streams.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::util::Deadline;

/// Which output stream a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTag {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl StreamTag {
    /// The tag as written in formatted lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reader pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// One line of text, without its terminator.
    Line(String),
    /// The stream reached end of input.
    EndOfStream,
}

/// One queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// Originating stream.
    pub stream: StreamTag,
    /// Line or end marker.
    pub payload: Payload,
}

/// Render a line the way output callbacks receive it: `[stdout]: text`.
///
/// Trailing whitespace is removed.
#[must_use]
pub fn format_line(stream: StreamTag, line: &str) -> String {
    format!("[{stream}]: {}", line.trim_end())
}

/// Split a line produced by [`format_line`] back into tag and text.
#[must_use]
pub fn parse_formatted(formatted: &str) -> Option<(StreamTag, &str)> {
    if let Some(text) = formatted.strip_prefix("[stdout]: ") {
        Some((StreamTag::Stdout, text))
    } else if let Some(text) = formatted.strip_prefix("[stderr]: ") {
        Some((StreamTag::Stderr, text))
    } else {
        None
    }
}

/// Result of one dequeue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeue {
    /// A record arrived.
    Record(OutputRecord),
    /// Nothing arrived within the poll interval.
    Idle,
    /// Every reader is gone and the queue is empty.
    Closed,
}

/// Two reader tasks and the queue they feed.
#[derive(Debug)]
pub struct StreamMultiplexer {
    rx: mpsc::UnboundedReceiver<OutputRecord>,
    readers: [(StreamTag, JoinHandle<()>); 2],
}

impl StreamMultiplexer {
    /// Spawn one reader per stream. Must be called inside a tokio runtime.
    pub fn start<O, E>(stdout: O, stderr: E) -> Self
    where
        O: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let out = tokio::spawn(read_lines(StreamTag::Stdout, stdout, tx.clone()));
        let err = tokio::spawn(read_lines(StreamTag::Stderr, stderr, tx));
        Self {
            rx,
            readers: [(StreamTag::Stdout, out), (StreamTag::Stderr, err)],
        }
    }

    /// Wait up to `poll` for the next record.
    pub async fn next(&mut self, poll: Duration) -> Dequeue {
        match tokio::time::timeout(poll, self.rx.recv()).await {
            Ok(Some(record)) => Dequeue::Record(record),
            Ok(None) => Dequeue::Closed,
            Err(_) => Dequeue::Idle,
        }
    }

    /// Stop consuming and give the readers `grace` to finish.
    ///
    /// Readers still blocked on their stream afterwards are detached and keep
    /// running until the stream ends or the runtime shuts down.
    pub async fn finish(self, grace: Duration) {
        let Self { rx, readers } = self;
        drop(rx);

        let deadline = Deadline::from_now(grace);
        for (stream, handle) in readers {
            match tokio::time::timeout(deadline.remaining(), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(%stream, error = %e, "Stream reader failed"),
                Err(_) => {
                    tracing::debug!(%stream, ?grace, "Stream reader still blocked; detaching");
                }
            }
        }
    }
}

async fn read_lines<R>(stream: StreamTag, reader: R, tx: mpsc::UnboundedSender<OutputRecord>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    buf.pop();
                    if buf.ends_with(b"\r") {
                        buf.pop();
                    }
                }
                let record = OutputRecord {
                    stream,
                    payload: Payload::Line(String::from_utf8_lossy(&buf).into_owned()),
                };
                if tx.send(record).is_err() {
                    // Consumer gone; nobody wants the rest.
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(%stream, error = %e, "Error reading command output");
                break;
            }
        }
    }

    let _ = tx.send(OutputRecord {
        stream,
        payload: Payload::EndOfStream,
    });
}
