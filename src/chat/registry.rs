//! Client and room registry.
//!
//! All client and room records live in one [`RegistryState`] guarded by a
//! single mutex inside [`Registry`]. Every operation runs under that lock;
//! handlers that need several steps to happen atomically (resolve a client,
//! resolve a room, join) use [`Registry::update`] so the whole unit runs
//! under one acquisition.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::server::Connection;

/// Identifier assigned to a client name.
pub type ClientId = u64;

/// Identifier assigned to a room name.
pub type RoomId = u64;

/// A registered client.
#[derive(Debug)]
struct ClientRecord {
    name: String,
    connection: Connection,
}

/// A room and its members.
#[derive(Debug)]
struct RoomRecord {
    name: String,
    members: BTreeSet<ClientId>,
}

/// Registry contents.
///
/// Only reachable through [`Registry`], so callers always hold the lock.
#[derive(Debug)]
pub struct RegistryState {
    clients: HashMap<ClientId, ClientRecord>,
    client_ids: HashMap<String, ClientId>,
    rooms: BTreeMap<RoomId, RoomRecord>,
    room_ids: HashMap<String, RoomId>,
    last_client_id: ClientId,
    last_room_id: RoomId,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
            client_ids: HashMap::new(),
            rooms: BTreeMap::new(),
            room_ids: HashMap::new(),
            last_client_id: 0,
            last_room_id: 0,
        }
    }

    /// Look up a client by name, registering it with `connection` if new.
    ///
    /// An existing client keeps its original connection; the one passed in
    /// is ignored.
    pub fn resolve_or_create_client(&mut self, name: &str, connection: &Connection) -> ClientId {
        if let Some(&id) = self.client_ids.get(name) {
            return id;
        }

        self.last_client_id += 1;
        let id = self.last_client_id;
        self.clients.insert(
            id,
            ClientRecord {
                name: name.to_string(),
                connection: connection.clone(),
            },
        );
        self.client_ids.insert(name.to_string(), id);
        debug!(client_id = id, name, peer = connection.peer(), "registered client");
        id
    }

    /// Look up a room by name, creating an empty one if new.
    pub fn resolve_or_create_room(&mut self, name: &str) -> RoomId {
        if let Some(&id) = self.room_ids.get(name) {
            return id;
        }

        self.last_room_id += 1;
        let id = self.last_room_id;
        self.rooms.insert(
            id,
            RoomRecord {
                name: name.to_string(),
                members: BTreeSet::new(),
            },
        );
        self.room_ids.insert(name.to_string(), id);
        debug!(room_id = id, name, "created room");
        id
    }

    /// Add a client to a room.
    ///
    /// Joining twice is a no-op. Returns false if the room does not exist.
    pub fn join_room(&mut self, room_id: RoomId, client_id: ClientId) -> bool {
        match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.members.insert(client_id);
                true
            }
            None => false,
        }
    }

    /// Remove a client from a room.
    ///
    /// Unknown rooms and non-members are ignored. Returns true if a member
    /// was actually removed.
    pub fn leave_room(&mut self, room_id: RoomId, client_id: ClientId) -> bool {
        self.rooms
            .get_mut(&room_id)
            .is_some_and(|room| room.members.remove(&client_id))
    }

    /// Rooms the client is currently a member of, in id order.
    pub fn rooms_containing(&self, client_id: ClientId) -> Vec<RoomId> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.members.contains(&client_id))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Close a client's connection and forget the client.
    ///
    /// The caller removes the client from its rooms first. Returns false if
    /// the id is unknown.
    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        let Some(record) = self.clients.remove(&client_id) else {
            return false;
        };
        debug_assert!(
            self.rooms_containing(client_id).is_empty(),
            "client removed while still a room member"
        );

        self.client_ids.remove(&record.name);
        record.connection.close();
        debug!(client_id, name = %record.name, "removed client");
        true
    }

    /// Get the connection of a registered client.
    pub fn client_connection(&self, client_id: ClientId) -> Option<&Connection> {
        self.clients.get(&client_id).map(|c| &c.connection)
    }

    /// Get the id registered for a client name.
    pub fn client_id(&self, name: &str) -> Option<ClientId> {
        self.client_ids.get(name).copied()
    }

    /// Get the id of a room by name.
    pub fn room_id(&self, name: &str) -> Option<RoomId> {
        self.room_ids.get(name).copied()
    }

    /// Get the name of a room.
    pub fn room_name(&self, room_id: RoomId) -> Option<&str> {
        self.rooms.get(&room_id).map(|r| r.name.as_str())
    }

    /// Members of a room in id order, or `None` if the room does not exist.
    pub fn room_members(&self, room_id: RoomId) -> Option<Vec<ClientId>> {
        self.rooms
            .get(&room_id)
            .map(|r| r.members.iter().copied().collect())
    }

    /// Check if a client is a member of a room.
    pub fn is_member(&self, room_id: RoomId, client_id: ClientId) -> bool {
        self.rooms
            .get(&room_id)
            .is_some_and(|r| r.members.contains(&client_id))
    }

    /// Get the number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get the number of rooms, empty ones included.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// Shared registry handed to every session.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::new()),
        }
    }

    /// Run `f` with exclusive access to the registry.
    ///
    /// `f` is synchronous, so the lock is never held across network I/O.
    pub async fn update<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        let mut state = self.lock().await;
        f(&mut state)
    }

    /// Run `f` with read access to the registry.
    pub async fn read<T>(&self, f: impl FnOnce(&RegistryState) -> T) -> T {
        let state = self.lock().await;
        f(&state)
    }

    async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// See [`RegistryState::resolve_or_create_client`].
    pub async fn resolve_or_create_client(&self, name: &str, connection: &Connection) -> ClientId {
        self.update(|s| s.resolve_or_create_client(name, connection))
            .await
    }

    /// See [`RegistryState::resolve_or_create_room`].
    pub async fn resolve_or_create_room(&self, name: &str) -> RoomId {
        self.update(|s| s.resolve_or_create_room(name)).await
    }

    /// See [`RegistryState::join_room`].
    pub async fn join_room(&self, room_id: RoomId, client_id: ClientId) -> bool {
        self.update(|s| s.join_room(room_id, client_id)).await
    }

    /// See [`RegistryState::leave_room`].
    pub async fn leave_room(&self, room_id: RoomId, client_id: ClientId) -> bool {
        self.update(|s| s.leave_room(room_id, client_id)).await
    }

    /// See [`RegistryState::rooms_containing`].
    pub async fn rooms_containing(&self, client_id: ClientId) -> Vec<RoomId> {
        self.read(|s| s.rooms_containing(client_id)).await
    }

    /// See [`RegistryState::remove_client`].
    pub async fn remove_client(&self, client_id: ClientId) -> bool {
        self.update(|s| s.remove_client(client_id)).await
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
