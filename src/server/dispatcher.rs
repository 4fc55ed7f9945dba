//! Command dispatch.
//!
//! [`Dispatcher::handle`] is the entry point for every command a session
//! reads. The request is decoded completely before the registry is
//! touched, so a protocol violation never leaves partial state behind.
//! The mutation, the reply and the broadcast of one command then run under
//! a single registry lock acquisition.

use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use super::connection::Connection;
use crate::chat::{broadcast, ClientId, Registry, RoomId};
use crate::protocol::frame::{join_reply, joined_notice, leave_reply, left_notice, ServerInfo};
use crate::protocol::{LineDecoder, Request, Verb};
use crate::Result;

/// Maps decoded commands onto the registry and broadcaster.
pub struct Dispatcher {
    registry: Arc<Registry>,
    server: ServerInfo,
}

impl Dispatcher {
    /// Create a dispatcher over a shared registry.
    pub fn new(registry: Arc<Registry>, server: ServerInfo) -> Self {
        Self { registry, server }
    }

    /// Get the shared registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handle one command.
    ///
    /// `first_line` has already been read from `lines`; the remaining
    /// fields are pulled from `lines`. Replies go to `connection`.
    pub async fn handle<R>(
        &self,
        first_line: &str,
        lines: &mut LineDecoder<R>,
        connection: &Connection,
    ) -> Result<Verb>
    where
        R: AsyncBufRead + Unpin,
    {
        let request = Request::decode(first_line, lines).await?;
        let verb = request.verb();
        self.execute(request, connection).await;
        Ok(verb)
    }

    /// Apply an already decoded request.
    pub async fn execute(&self, request: Request, connection: &Connection) {
        match request {
            Request::Join {
                room_name,
                client_name,
                ..
            } => {
                self.join(&room_name, &client_name, connection).await;
            }
            Request::Leave {
                room_id,
                client_id,
                client_name,
            } => {
                self.leave(room_id, client_id, &client_name, connection)
                    .await;
            }
            Request::Chat {
                room_id,
                client_id,
                client_name,
                message,
            } => {
                self.chat(room_id, client_id, &client_name, &message).await;
            }
            Request::Disconnect { client_name, .. } => {
                self.disconnect(&client_name, connection).await;
            }
        }
    }

    async fn join(&self, room_name: &str, client_name: &str, connection: &Connection) {
        let (room_id, client_id, reached) = self
            .registry
            .update(|state| {
                let client_id = state.resolve_or_create_client(client_name, connection);
                let room_id = state.resolve_or_create_room(room_name);
                state.join_room(room_id, client_id);

                reply(
                    connection,
                    join_reply(room_name, &self.server, room_id, client_id),
                );
                let outcome = broadcast(state, room_id, client_name, &joined_notice(client_name));
                (room_id, client_id, outcome.delivered())
            })
            .await;

        info!(
            room = room_name,
            room_id,
            client = client_name,
            client_id,
            members_notified = reached,
            "client joined room"
        );
    }

    async fn leave(
        &self,
        room_id: RoomId,
        client_id: ClientId,
        client_name: &str,
        connection: &Connection,
    ) {
        // Ids are taken as supplied; the leaving member still gets the notice.
        let removed = self
            .registry
            .update(|state| {
                reply(connection, leave_reply(room_id, client_id));
                broadcast(state, room_id, client_name, &left_notice(client_name));
                state.leave_room(room_id, client_id)
            })
            .await;

        info!(
            room_id,
            client = client_name,
            client_id,
            was_member = removed,
            "client left room"
        );
    }

    async fn chat(&self, room_id: RoomId, client_id: ClientId, client_name: &str, message: &str) {
        let outcome = self
            .registry
            .read(|state| broadcast(state, room_id, client_name, message))
            .await;

        debug!(
            room_id,
            client = client_name,
            client_id,
            ?outcome,
            "chat message relayed"
        );
    }

    async fn disconnect(&self, client_name: &str, connection: &Connection) {
        // An unknown name gets a fresh id here just to be removed again.
        let (client_id, rooms) = self
            .registry
            .update(|state| {
                let client_id = state.resolve_or_create_client(client_name, connection);
                let rooms = state.rooms_containing(client_id);
                let notice = left_notice(client_name);
                for &room_id in &rooms {
                    broadcast(state, room_id, client_name, &notice);
                    state.leave_room(room_id, client_id);
                }
                state.remove_client(client_id);
                (client_id, rooms)
            })
            .await;

        info!(
            client = client_name,
            client_id,
            rooms_left = rooms.len(),
            "client disconnected"
        );
    }
}

fn reply(connection: &Connection, frame: String) {
    if let Err(e) = connection.send(frame) {
        warn!(peer = connection.peer(), error = %e, "failed to queue reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::server::Outbox;
    use crate::RelayError;
    use tokio::io::BufReader;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Registry::new()), ServerInfo::new("10.0.0.1", 5000))
    }

    async fn send(
        dispatcher: &Dispatcher,
        connection: &Connection,
        input: &'static str,
    ) -> Result<Verb> {
        let mut lines = LineDecoder::new(BufReader::new(input.as_bytes()));
        let first = lines.next_line().await?.unwrap_or_default();
        dispatcher.handle(&first, &mut lines, connection).await
    }

    async fn drain(outbox: &mut Outbox) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) =
            tokio::time::timeout(std::time::Duration::from_millis(20), outbox.recv()).await
        {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn test_join_replies_and_announces() {
        let d = dispatcher();
        let (alice, mut outbox) = Connection::channel("alice", 8);

        let verb = send(
            &d,
            &alice,
            "JOIN_CHATROOM:general\nCLIENT_IP:127.0.0.1\nPORT:4000\nCLIENT_NAME:alice\n",
        )
        .await
        .unwrap();

        assert_eq!(verb, Verb::Join);
        assert_eq!(
            drain(&mut outbox).await,
            vec![
                "JOINED_CHATROOM:general\nSERVER_IP:10.0.0.1\nPORT:5000\nROOM_REF:1\nJOIN_ID:1\n"
                    .to_string(),
                "CHAT:1CLIENT_NAME:aliceMESSAGE:alice has joined this chatroom.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_join_abort_leaves_no_state() {
        let d = dispatcher();
        let (conn, mut outbox) = Connection::channel("c", 8);

        let err = send(&d, &conn, "JOIN_CHATROOM:lobby\nPORT:4000\n")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayError::Protocol(ProtocolError::UnexpectedField { expected: "CLIENT_IP:", .. })
        ));
        assert_eq!(d.registry().read(|s| s.room_count()).await, 0);
        assert_eq!(d.registry().read(|s| s.room_id("lobby")).await, None);
        assert_eq!(d.registry().read(|s| s.client_count()).await, 0);
        assert!(drain(&mut outbox).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let d = dispatcher();
        let (conn, mut outbox) = Connection::channel("c", 8);

        let err = send(&d, &conn, "HELO hello\n").await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Protocol(ProtocolError::UnknownCommand(_))
        ));
        assert!(drain(&mut outbox).await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_notifies_leaver_then_removes() {
        let d = dispatcher();
        let (alice, mut alice_out) = Connection::channel("alice", 8);
        let (bob, mut bob_out) = Connection::channel("bob", 8);

        send(&d, &alice, "JOIN_CHATROOM:general\nCLIENT_IP:0\nPORT:0\nCLIENT_NAME:alice\n")
            .await
            .unwrap();
        send(&d, &bob, "JOIN_CHATROOM:general\nCLIENT_IP:0\nPORT:0\nCLIENT_NAME:bob\n")
            .await
            .unwrap();
        drain(&mut alice_out).await;
        drain(&mut bob_out).await;

        let verb = send(&d, &bob, "LEAVE_CHATROOM:1\nJOIN_ID:2\nCLIENT_NAME:bob\n")
            .await
            .unwrap();
        assert_eq!(verb, Verb::Leave);

        assert_eq!(
            drain(&mut bob_out).await,
            vec![
                "LEFT_CHATROOM:1\nJOIN_ID:2\n".to_string(),
                "CHAT:1CLIENT_NAME:bobMESSAGE:bob has left this chatroom.".to_string(),
            ]
        );
        assert_eq!(
            drain(&mut alice_out).await,
            vec!["CHAT:1CLIENT_NAME:bobMESSAGE:bob has left this chatroom.".to_string()]
        );
        assert_eq!(d.registry().read(|s| s.room_members(1)).await, Some(vec![1]));

        // Second leave is harmless
        send(&d, &bob, "LEAVE_CHATROOM:1\nJOIN_ID:2\nCLIENT_NAME:bob\n")
            .await
            .unwrap();
        assert_eq!(d.registry().read(|s| s.room_members(1)).await, Some(vec![1]));
    }

    #[tokio::test]
    async fn test_leave_unknown_room_still_replies() {
        let d = dispatcher();
        let (conn, mut outbox) = Connection::channel("c", 8);

        send(&d, &conn, "LEAVE_CHATROOM:9\nJOIN_ID:4\nCLIENT_NAME:ghost\n")
            .await
            .unwrap();

        assert_eq!(
            drain(&mut outbox).await,
            vec!["LEFT_CHATROOM:9\nJOIN_ID:4\n".to_string()]
        );
        assert_eq!(d.registry().read(|s| s.room_count()).await, 0);
    }

    #[tokio::test]
    async fn test_chat_reaches_sender_and_members() {
        let d = dispatcher();
        let (alice, mut alice_out) = Connection::channel("alice", 8);
        let (bob, mut bob_out) = Connection::channel("bob", 8);

        send(&d, &alice, "JOIN_CHATROOM:general\nCLIENT_IP:0\nPORT:0\nCLIENT_NAME:alice\n")
            .await
            .unwrap();
        send(&d, &bob, "JOIN_CHATROOM:general\nCLIENT_IP:0\nPORT:0\nCLIENT_NAME:bob\n")
            .await
            .unwrap();
        drain(&mut alice_out).await;
        drain(&mut bob_out).await;

        let verb = send(
            &d,
            &bob,
            "CHAT:1\nJOIN_ID:2\nCLIENT_NAME:bob\nMESSAGE:hello\nworld\n\n",
        )
        .await
        .unwrap();
        assert_eq!(verb, Verb::Chat);

        let expected = vec!["CHAT:1CLIENT_NAME:bobMESSAGE:helloworld".to_string()];
        assert_eq!(drain(&mut alice_out).await, expected);
        assert_eq!(drain(&mut bob_out).await, expected);
    }

    #[tokio::test]
    async fn test_chat_to_missing_room_is_silent() {
        let d = dispatcher();
        let (conn, mut outbox) = Connection::channel("c", 8);

        send(&d, &conn, "CHAT:5\nJOIN_ID:1\nCLIENT_NAME:a\nMESSAGE:hi\n\n")
            .await
            .unwrap();
        assert!(drain(&mut outbox).await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_leaves_all_rooms() {
        let d = dispatcher();
        let (alice, mut alice_out) = Connection::channel("alice", 16);
        let (bob, mut bob_out) = Connection::channel("bob", 16);

        for room in ["one", "two"] {
            let join = format!("JOIN_CHATROOM:{room}\nCLIENT_IP:0\nPORT:0\nCLIENT_NAME:alice\n");
            let mut lines = LineDecoder::new(BufReader::new(join.as_bytes()));
            let first = lines.next_line().await.unwrap().unwrap();
            d.handle(&first, &mut lines, &alice).await.unwrap();
        }
        send(&d, &bob, "JOIN_CHATROOM:two\nCLIENT_IP:0\nPORT:0\nCLIENT_NAME:bob\n")
            .await
            .unwrap();
        drain(&mut alice_out).await;
        drain(&mut bob_out).await;

        let verb = send(&d, &alice, "DISCONNECT:0\nPORT:0\nCLIENT_NAME:alice\n")
            .await
            .unwrap();
        assert_eq!(verb, Verb::Disconnect);

        assert_eq!(
            drain(&mut alice_out).await,
            vec![
                "CHAT:1CLIENT_NAME:aliceMESSAGE:alice has left this chatroom.".to_string(),
                "CHAT:2CLIENT_NAME:aliceMESSAGE:alice has left this chatroom.".to_string(),
            ]
        );
        assert_eq!(
            drain(&mut bob_out).await,
            vec!["CHAT:2CLIENT_NAME:aliceMESSAGE:alice has left this chatroom.".to_string()]
        );
        assert!(alice.is_closed());
        assert_eq!(d.registry().read(|s| s.client_id("alice")).await, None);
        assert!(d.registry().rooms_containing(1).await.is_empty());

        // Later broadcasts never reach alice
        send(&d, &bob, "CHAT:2\nJOIN_ID:2\nCLIENT_NAME:bob\nMESSAGE:bye\n\n")
            .await
            .unwrap();
        assert_eq!(
            drain(&mut bob_out).await,
            vec!["CHAT:2CLIENT_NAME:bobMESSAGE:bye".to_string()]
        );
        assert!(drain(&mut alice_out).await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unknown_name_creates_and_removes() {
        let d = dispatcher();
        let (known, _known_out) = Connection::channel("known", 8);
        d.registry().resolve_or_create_client("known", &known).await;

        let (stranger, _out) = Connection::channel("stranger", 8);
        send(&d, &stranger, "DISCONNECT:0\nPORT:0\nCLIENT_NAME:stranger\n")
            .await
            .unwrap();

        assert!(stranger.is_closed());
        assert_eq!(d.registry().read(|s| s.client_count()).await, 1);

        // The spurious id was consumed
        let (late, _late_out) = Connection::channel("late", 8);
        let id = d.registry().resolve_or_create_client("late", &late).await;
        assert_eq!(id, 3);
    }
}
