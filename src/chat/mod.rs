//! Chat state for the relay.
//!
//! This module provides:
//! - The client/room registry shared by every session
//! - Room broadcasts to member connections

mod broadcast;
mod registry;

pub use broadcast::{broadcast, BroadcastOutcome};
pub use registry::{ClientId, Registry, RegistryState, RoomId};
