//! Line protocol for the relay.
//!
//! Requests are blocks of `TAG:value` lines. The first line picks the
//! command; the rest are read in a fixed order by [`Request::decode`].
//! Replies and broadcasts are built in [`frame`].

mod command;
mod decoder;
pub mod frame;

pub use command::{tag, Request, Verb};
pub use decoder::{field_value, parse_id, LineDecoder};
pub use frame::ServerInfo;
