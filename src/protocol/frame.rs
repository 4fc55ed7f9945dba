//! Outbound frame formatting.

use std::net::{IpAddr, SocketAddr};

use crate::chat::{ClientId, RoomId};
use crate::config::ServerConfig;

/// Address and port reported to clients in join replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Value of `SERVER_IP:`.
    pub ip: String,
    /// Value of `PORT:`.
    pub port: u16,
}

impl ServerInfo {
    /// Create server info.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Build the advertised address from configuration.
    ///
    /// Unset advertised values fall back to the bind host and to the port
    /// the listener actually got.
    pub fn from_config(config: &ServerConfig, bound: SocketAddr) -> Self {
        Self {
            ip: config
                .advertised_host
                .clone()
                .unwrap_or_else(|| config.host.clone()),
            port: config.advertised_port.unwrap_or(bound.port()),
        }
    }

    /// Check whether the advertised address is a wildcard like `0.0.0.0`.
    ///
    /// Clients cannot reach a wildcard address, so one usually means
    /// `advertised_host` was left unset on a server bound to all interfaces.
    pub fn is_unspecified(&self) -> bool {
        self.ip
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_unspecified())
    }
}

/// Reply sent to a client after it joins a room.
pub fn join_reply(room_name: &str, server: &ServerInfo, room_id: RoomId, client_id: ClientId) -> String {
    format!(
        "JOINED_CHATROOM:{room_name}\nSERVER_IP:{}\nPORT:{}\nROOM_REF:{room_id}\nJOIN_ID:{client_id}\n",
        server.ip, server.port
    )
}

/// Reply sent to a client after it leaves a room.
pub fn leave_reply(room_id: RoomId, client_id: ClientId) -> String {
    format!("LEFT_CHATROOM:{room_id}\nJOIN_ID:{client_id}\n")
}

/// Frame delivered to every member of a room.
///
/// Fields are concatenated with no separators and no line terminator.
pub fn chat_frame(room_id: RoomId, sender_name: &str, text: &str) -> String {
    format!("CHAT:{room_id}CLIENT_NAME:{sender_name}MESSAGE:{text}")
}

/// Notice broadcast when a client joins a room.
pub fn joined_notice(name: &str) -> String {
    format!("{name} has joined this chatroom.")
}

/// Notice broadcast when a client leaves a room or disconnects.
pub fn left_notice(name: &str) -> String {
    format!("{name} has left this chatroom.")
}
