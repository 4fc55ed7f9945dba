//! Write handles for connected clients.
//!
//! A [`Connection`] is the handle stored in the registry and used by the
//! session for replies. Frames go into a bounded queue that the
//! connection's [`Outbox`] drains to the socket from a dedicated writer
//! task, so nothing ever writes to a socket while holding the registry lock.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::SendError;

/// Cloneable write handle for one client connection.
#[derive(Clone)]
pub struct Connection {
    /// Peer description used in logs.
    peer: Arc<str>,
    /// Queue drained by the writer task.
    frames: mpsc::Sender<String>,
    /// Set to true once the connection is closed.
    closed: Arc<watch::Sender<bool>>,
}

impl Connection {
    /// Create a connection handle and the outbox that drains it.
    ///
    /// `capacity` bounds the number of frames waiting to be written.
    pub fn channel(peer: impl Into<String>, capacity: usize) -> (Self, Outbox) {
        let (frames_tx, frames_rx) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed_rx) = watch::channel(false);
        let peer: Arc<str> = Arc::from(peer.into());

        let connection = Self {
            peer: Arc::clone(&peer),
            frames: frames_tx,
            closed: Arc::new(closed_tx),
        };
        let outbox = Outbox {
            peer,
            frames: frames_rx,
            closed: closed_rx,
        };
        (connection, outbox)
    }

    /// Get the peer description.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queue a frame without waiting.
    ///
    /// Fails with [`SendError::QueueFull`] when the writer is behind and
    /// with [`SendError::Closed`] once the connection has been closed.
    pub fn send(&self, frame: impl Into<String>) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.frames.try_send(frame.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Close the connection.
    ///
    /// Frames already queued are still written before the socket is shut
    /// down. Closing twice is harmless.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            debug!(peer = %self.peer, "connection closed");
        }
    }

    /// Check whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Check whether two handles refer to the same connection.
    pub fn same_connection(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.closed, &other.closed)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving side of a connection's frame queue.
pub struct Outbox {
    peer: Arc<str>,
    frames: mpsc::Receiver<String>,
    closed: watch::Receiver<bool>,
}

impl Outbox {
    /// Receive the next frame.
    ///
    /// Returns `None` once the connection is closed and the queue is
    /// drained, or when every handle has been dropped.
    pub async fn recv(&mut self) -> Option<String> {
        if let Ok(frame) = self.frames.try_recv() {
            return Some(frame);
        }
        if *self.closed.borrow() {
            // Frames queued just before the close still go out.
            return self.frames.try_recv().ok();
        }

        tokio::select! {
            biased;
            frame = self.frames.recv() => return frame,
            _ = self.closed.wait_for(|closed| *closed) => {}
        }

        // Closed while idle; hand out whatever raced in before the close.
        self.frames.try_recv().ok()
    }

    /// Drain frames into `writer` until the connection closes.
    ///
    /// Each frame must be written within `write_timeout`; a slow or broken
    /// peer ends this writer only. The writer is shut down on exit.
    pub async fn run<W>(mut self, mut writer: W, write_timeout: Duration)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(frame) = self.recv().await {
            match tokio::time::timeout(write_timeout, write_frame(&mut writer, &frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(peer = %self.peer, error = %e, "write failed, stopping writer");
                    break;
                }
                Err(_) => {
                    warn!(peer = %self.peer, ?write_timeout, "write timed out, stopping writer");
                    break;
                }
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!(peer = %self.peer, error = %e, "shutdown after writer exit failed");
        }
        debug!(peer = %self.peer, "writer finished");
    }
}

async fn write_frame<W>(writer: &mut W, frame: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}
