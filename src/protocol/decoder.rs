//! Line decoder for one connection.
//!
//! Command handlers pull lines through [`LineDecoder`] one field at a
//! time: "read the next line, it must carry tag X".

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::ProtocolError;
use crate::RelayError;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Reads newline-terminated lines and extracts tagged field values.
pub struct LineDecoder<R> {
    reader: R,
    read_timeout: Option<Duration>,
    line: String,
}

impl<R> LineDecoder<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Create a decoder without a read timeout.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            read_timeout: None,
            line: String::new(),
        }
    }

    /// Create a decoder whose field reads give up after `timeout`.
    ///
    /// The limit covers the lines that complete a command. Waiting for the
    /// first line of the next command is never limited, so an idle client
    /// keeps its session.
    pub fn with_timeout(reader: R, timeout: Option<Duration>) -> Self {
        Self {
            reader,
            read_timeout: timeout,
            line: String::new(),
        }
    }

    /// Read the next line with its terminator stripped.
    ///
    /// Returns `Ok(None)` at end of stream. No read timeout applies.
    pub async fn next_line(&mut self) -> Result<Option<String>, RelayError> {
        self.line.clear();
        let bytes = self.reader.read_line(&mut self.line).await?;
        Ok(self.take_line(bytes))
    }

    /// Read a line that continues the current command, under the read timeout.
    async fn next_field_line(&mut self) -> Result<Option<String>, RelayError> {
        self.line.clear();
        let read = self.reader.read_line(&mut self.line);
        let bytes = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ProtocolError::Timeout)??,
            None => read.await?,
        };
        Ok(self.take_line(bytes))
    }

    fn take_line(&self, bytes: usize) -> Option<String> {
        (bytes > 0).then(|| self.line.trim_end_matches(LINE_ENDINGS).to_string())
    }

    /// Read the next line and return the trimmed value after `tag`.
    ///
    /// A line with any other tag, or the end of the stream, is a protocol
    /// violation.
    pub async fn expect_field(&mut self, tag: &'static str) -> Result<String, RelayError> {
        let line = self
            .next_field_line()
            .await?
            .ok_or(ProtocolError::ConnectionClosed { expected: tag })?;
        match field_value(&line, tag) {
            Some(value) => Ok(value.to_string()),
            None => Err(ProtocolError::UnexpectedField {
                expected: tag,
                found: line,
            }
            .into()),
        }
    }

    /// Like [`expect_field`](Self::expect_field) but the value must be an id.
    pub async fn expect_id(&mut self, tag: &'static str) -> Result<u64, RelayError> {
        let value = self.expect_field(tag).await?;
        Ok(parse_id(tag, &value)?)
    }

    /// Read the body of a chat message.
    ///
    /// `tag` introduces the first line; following non-empty lines are
    /// appended verbatim (after trimming) until an empty line or the end
    /// of the stream.
    pub async fn expect_message(&mut self, tag: &'static str) -> Result<String, RelayError> {
        let mut text = self.expect_field(tag).await?;
        while let Some(line) = self.next_field_line().await? {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            text.push_str(line);
        }
        Ok(text)
    }
}

/// Return the trimmed value of `line` if it starts with `tag`.
pub fn field_value<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(tag).map(str::trim)
}

/// Parse a numeric id field.
pub fn parse_id(tag: &'static str, value: &str) -> Result<u64, ProtocolError> {
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        tag,
        value: value.to_string(),
    })
}
