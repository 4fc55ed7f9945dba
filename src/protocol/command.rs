//! Command verbs and request decoding.

use tokio::io::AsyncBufRead;

use super::decoder::{field_value, parse_id, LineDecoder};
use crate::chat::{ClientId, RoomId};
use crate::error::ProtocolError;
use crate::RelayError;

/// Field tags of the line protocol.
pub mod tag {
    pub const JOIN_CHATROOM: &str = "JOIN_CHATROOM:";
    pub const LEAVE_CHATROOM: &str = "LEAVE_CHATROOM:";
    pub const CHAT: &str = "CHAT:";
    pub const DISCONNECT: &str = "DISCONNECT:";
    pub const CLIENT_IP: &str = "CLIENT_IP:";
    pub const PORT: &str = "PORT:";
    pub const CLIENT_NAME: &str = "CLIENT_NAME:";
    pub const JOIN_ID: &str = "JOIN_ID:";
    pub const MESSAGE: &str = "MESSAGE:";
}

/// Command selected by the first line of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `JOIN_CHATROOM:`
    Join,
    /// `LEAVE_CHATROOM:`
    Leave,
    /// `CHAT:`
    Chat,
    /// `DISCONNECT:`
    Disconnect,
}

impl Verb {
    /// Tag that introduces this verb.
    pub fn tag(&self) -> &'static str {
        match self {
            Verb::Join => tag::JOIN_CHATROOM,
            Verb::Leave => tag::LEAVE_CHATROOM,
            Verb::Chat => tag::CHAT,
            Verb::Disconnect => tag::DISCONNECT,
        }
    }

    /// Get the verb name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Join => "join",
            Verb::Leave => "leave",
            Verb::Chat => "chat",
            Verb::Disconnect => "disconnect",
        }
    }

    /// Recognize the verb of a first line and return it with its value.
    pub fn parse(line: &str) -> Option<(Verb, &str)> {
        [Verb::Join, Verb::Leave, Verb::Chat, Verb::Disconnect]
            .into_iter()
            .find_map(|verb| field_value(line, verb.tag()).map(|value| (verb, value)))
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Join (and create if needed) a room by name.
    Join {
        room_name: String,
        client_ip: String,
        port: String,
        client_name: String,
    },
    /// Leave a room by id.
    Leave {
        room_id: RoomId,
        client_id: ClientId,
        client_name: String,
    },
    /// Send a message to a room.
    Chat {
        room_id: RoomId,
        client_id: ClientId,
        client_name: String,
        message: String,
    },
    /// Leave every room and drop the client.
    Disconnect {
        client_ip: String,
        port: String,
        client_name: String,
    },
}

impl Request {
    /// Get the verb of this request.
    pub fn verb(&self) -> Verb {
        match self {
            Request::Join { .. } => Verb::Join,
            Request::Leave { .. } => Verb::Leave,
            Request::Chat { .. } => Verb::Chat,
            Request::Disconnect { .. } => Verb::Disconnect,
        }
    }

    /// Decode a request whose first line has already been read.
    ///
    /// Reads exactly the fields the verb requires, in order, and stops at
    /// the first one that does not match.
    pub async fn decode<R>(first_line: &str, lines: &mut LineDecoder<R>) -> Result<Self, RelayError>
    where
        R: AsyncBufRead + Unpin,
    {
        let (verb, value) = Verb::parse(first_line)
            .ok_or_else(|| ProtocolError::UnknownCommand(first_line.to_string()))?;

        let request = match verb {
            Verb::Join => {
                let room_name = value.to_string();
                let client_ip = lines.expect_field(tag::CLIENT_IP).await?;
                let port = lines.expect_field(tag::PORT).await?;
                let client_name = lines.expect_field(tag::CLIENT_NAME).await?;
                Request::Join {
                    room_name,
                    client_ip,
                    port,
                    client_name,
                }
            }
            Verb::Leave => {
                let room_id = parse_id(tag::LEAVE_CHATROOM, value)?;
                let client_id = lines.expect_id(tag::JOIN_ID).await?;
                let client_name = lines.expect_field(tag::CLIENT_NAME).await?;
                Request::Leave {
                    room_id,
                    client_id,
                    client_name,
                }
            }
            Verb::Chat => {
                let room_id = parse_id(tag::CHAT, value)?;
                let client_id = lines.expect_id(tag::JOIN_ID).await?;
                let client_name = lines.expect_field(tag::CLIENT_NAME).await?;
                let message = lines.expect_message(tag::MESSAGE).await?;
                Request::Chat {
                    room_id,
                    client_id,
                    client_name,
                    message,
                }
            }
            Verb::Disconnect => {
                let client_ip = value.to_string();
                let port = lines.expect_field(tag::PORT).await?;
                let client_name = lines.expect_field(tag::CLIENT_NAME).await?;
                Request::Disconnect {
                    client_ip,
                    port,
                    client_name,
                }
            }
        };

        Ok(request)
    }
}
