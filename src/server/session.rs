//! Per-connection session loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::dispatcher::Dispatcher;
use crate::config::ServerConfig;
use crate::error::ProtocolError;
use crate::protocol::LineDecoder;
use crate::RelayError;

/// Timeouts and buffer sizes applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Limit on waiting for the next line, `None` for no limit.
    pub read_timeout: Option<Duration>,
    /// Limit on writing a single frame.
    pub write_timeout: Duration,
    /// Frames queued per connection before broadcasts to it are dropped.
    pub outbound_queue_size: usize,
}

impl SessionSettings {
    /// Build settings from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            outbound_queue_size: config.outbound_queue_size,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed its side of the stream.
    Eof,
    /// The connection was closed by a disconnect.
    Closed,
    /// The client went quiet for longer than the read timeout.
    TimedOut,
    /// Reading failed.
    Error(String),
}

/// Reads commands from one connection and hands them to the dispatcher.
pub struct Session<R> {
    lines: LineDecoder<R>,
    connection: Connection,
}

impl<R> Session<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Create a session reading from `reader` and replying via `connection`.
    pub fn new(reader: R, connection: Connection, read_timeout: Option<Duration>) -> Self {
        Self {
            lines: LineDecoder::with_timeout(reader, read_timeout),
            connection,
        }
    }

    /// Process commands until the stream ends or the connection is closed.
    pub async fn run(mut self, dispatcher: &Dispatcher) -> SessionEnd {
        loop {
            let line = tokio::select! {
                _ = self.connection.closed() => return SessionEnd::Closed,
                line = self.lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return SessionEnd::Eof,
                Err(e) => return SessionEnd::Error(e.to_string()),
            };
            if line.trim().is_empty() {
                continue;
            }

            match dispatcher
                .handle(&line, &mut self.lines, &self.connection)
                .await
            {
                Ok(verb) => {
                    debug!(peer = self.connection.peer(), %verb, "command handled");
                }
                Err(RelayError::Protocol(ProtocolError::UnknownCommand(command))) => {
                    warn!(peer = self.connection.peer(), command = %command, "no such command");
                }
                Err(RelayError::Protocol(ProtocolError::ConnectionClosed { expected })) => {
                    warn!(peer = self.connection.peer(), expected, "stream ended mid-command");
                    return SessionEnd::Eof;
                }
                Err(RelayError::Protocol(ProtocolError::Timeout)) => {
                    warn!(peer = self.connection.peer(), "timed out mid-command");
                    return SessionEnd::TimedOut;
                }
                Err(RelayError::Io(e)) => return SessionEnd::Error(e.to_string()),
                Err(e) => {
                    warn!(peer = self.connection.peer(), error = %e, "command aborted");
                }
            }
        }
    }
}

/// Serve one connected stream until its session ends.
///
/// The stream is split: a writer task drains the connection's outbox to
/// the write half while the session reads commands from the read half.
/// When the session ends the connection is closed, so the writer flushes
/// what is queued and shuts the socket down. A client record left in the
/// registry then fails its deliveries with `SendError::Closed`.
pub async fn serve_stream<S>(
    stream: S,
    peer: String,
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (connection, outbox) = Connection::channel(peer.clone(), settings.outbound_queue_size);
    tokio::spawn(outbox.run(write_half, settings.write_timeout));

    info!(peer = %peer, "session started");
    let end = Session::new(
        BufReader::new(read_half),
        connection.clone(),
        settings.read_timeout,
    )
    .run(&dispatcher)
    .await;
    connection.close();
    info!(peer = %peer, reason = ?end, "session ended");
    end
}
