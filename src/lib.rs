//! chatrelay - a line-protocol chat relay.
//!
//! Clients connect over TCP, join named rooms, send messages that are
//! relayed to every member of a room, leave rooms and disconnect.

pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;

pub use chat::{broadcast, BroadcastOutcome, ClientId, Registry, RegistryState, RoomId};
pub use config::Config;
pub use error::{ProtocolError, RelayError, Result, SendError};
pub use protocol::{LineDecoder, Request, ServerInfo, Verb};
pub use server::{
    serve_stream, Connection, ConnectionPermit, Dispatcher, Outbox, RelayServer, Session,
    SessionEnd, SessionSettings,
};
