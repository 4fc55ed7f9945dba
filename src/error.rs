//! Error types for the chat relay.

use thiserror::Error;

/// Common error type for the chat relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command was aborted because the client broke the line protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Violations of the line protocol.
///
/// Every variant aborts the command being decoded. None of them are sent
/// back to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The first line of a command did not name a known verb.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// A required field line carried the wrong tag.
    #[error("expected {expected} but got {found:?}")]
    UnexpectedField {
        /// Tag the command needed next.
        expected: &'static str,
        /// The line actually received.
        found: String,
    },

    /// A numeric field did not parse.
    #[error("{tag} is not a valid id: {value:?}")]
    InvalidNumber {
        /// Tag of the offending field.
        tag: &'static str,
        /// Raw value.
        value: String,
    },

    /// The stream ended while a field was still required.
    #[error("connection closed while waiting for {expected}")]
    ConnectionClosed {
        /// Tag the command needed next.
        expected: &'static str,
    },

    /// The client stayed silent longer than the read timeout.
    #[error("timed out waiting for input")]
    Timeout,
}

/// Failure to hand a frame to a connection's writer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The outbound queue is full; the recipient is not keeping up.
    #[error("outbound queue is full")]
    QueueFull,

    /// The connection was closed or its writer has gone away.
    #[error("connection is closed")]
    Closed,
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
