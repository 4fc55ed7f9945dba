//! Relay server module.
//!
//! This module provides the TCP listener, per-connection sessions, the
//! command dispatcher and the write handles stored in the registry.

mod connection;
mod dispatcher;
mod listener;
mod session;

pub use connection::{Connection, Outbox};
pub use dispatcher::Dispatcher;
pub use listener::{ConnectionPermit, RelayServer};
pub use session::{serve_stream, Session, SessionEnd, SessionSettings};
