//! Room broadcasts.

use tracing::{debug, warn};

use super::registry::{RegistryState, RoomId};
use crate::protocol::frame::chat_frame;

/// Result of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The room does not exist; nothing was sent.
    RoomNotFound,
    /// The frame was offered to every member.
    Delivered {
        /// Members whose queue accepted the frame.
        delivered: usize,
        /// Members that could not be reached.
        failed: usize,
    },
}

impl BroadcastOutcome {
    /// Number of members the frame was queued for.
    pub fn delivered(&self) -> usize {
        match self {
            BroadcastOutcome::RoomNotFound => 0,
            BroadcastOutcome::Delivered { delivered, .. } => *delivered,
        }
    }
}

/// Send a chat frame from `sender_name` to every member of a room.
///
/// A member that cannot be reached is logged and skipped; the rest still
/// get the frame. Sending only queues frames, so this never blocks while
/// the caller holds the registry lock.
pub fn broadcast(
    state: &RegistryState,
    room_id: RoomId,
    sender_name: &str,
    text: &str,
) -> BroadcastOutcome {
    let Some(members) = state.room_members(room_id) else {
        warn!(room_id, "chat room not found, broadcast dropped");
        return BroadcastOutcome::RoomNotFound;
    };

    let frame = chat_frame(room_id, sender_name, text);
    let mut delivered = 0;
    let mut failed = 0;

    for member in members {
        let Some(connection) = state.client_connection(member) else {
            warn!(room_id, client_id = member, "room member has no client record");
            failed += 1;
            continue;
        };
        match connection.send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(room_id, client_id = member, peer = connection.peer(), error = %e, "failed to deliver chat frame");
                failed += 1;
            }
        }
    }

    debug!(room_id, sender = sender_name, delivered, failed, "broadcast");
    BroadcastOutcome::Delivered { delivered, failed }
}
