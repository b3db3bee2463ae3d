//! Client registry
//!
//! Growable table of client slots. A free slot holds a tombstone (`None`)
//! and is reused by the next registration. Slot ids are positions in the
//! table and never move, including across growth.
//!
//! The registry itself is not synchronized; `ChatServer` keeps it behind a
//! single mutex so every call here runs inside one critical section.

use crate::client::{Client, ClientHandle};
use crate::error::RegistryError;
use crate::types::{ClientId, Username};

/// Capacity of the table after its first growth
pub const INITIAL_CAPACITY: usize = 10;

/// Point-in-time copy of one live slot, used for routing
#[derive(Debug, Clone)]
pub struct LiveClient {
    pub id: ClientId,
    pub handle: ClientHandle,
    pub username: Option<Username>,
}

impl LiveClient {
    /// Check if this client has joined the chat
    pub fn is_registered(&self) -> bool {
        self.username.is_some()
    }
}

/// Registry of connected clients
#[derive(Debug, Default)]
pub struct ClientRegistry {
    /// Slot table; `None` marks a tombstone
    slots: Vec<Option<Client>>,
    /// Number of live slots
    count: usize,
    /// Optional hard limit on live slots
    limit: Option<usize>,
}

impl ClientRegistry {
    /// Create an empty, unbounded registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry holding at most `limit` live clients
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Register a connection in a free slot
    ///
    /// Grows the table when every slot is live. Returns the slot id.
    pub fn register(&mut self, handle: ClientHandle) -> Result<ClientId, RegistryError> {
        if let Some(limit) = self.limit {
            if self.count >= limit {
                return Err(RegistryError::Full { limit });
            }
        }

        if self.count == self.slots.len() {
            self.grow()?;
        }

        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        let id = ClientId(index);
        self.slots[index] = Some(Client::new(id, handle));
        self.count += 1;
        Ok(id)
    }

    /// Remove a client, closing its connection and freeing its slot
    ///
    /// Returns the removed record so the caller can announce the departure.
    pub fn remove(&mut self, id: ClientId) -> Result<Client, RegistryError> {
        let client = self
            .slots
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(RegistryError::UnknownClient(id))?;

        self.count -= 1;
        client.handle.close();
        Ok(client)
    }

    /// Bind a username to a live slot
    ///
    /// The uniqueness check and the binding happen together, so two
    /// handshakes racing for the same name cannot both succeed.
    pub fn bind_username(&mut self, id: ClientId, username: Username) -> Result<(), RegistryError> {
        if let Some(owner) = self.lookup_by_username(username.as_str()) {
            if owner != id {
                return Err(RegistryError::UsernameTaken);
            }
        }

        let client = self
            .slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(RegistryError::UnknownClient(id))?;
        client.username = Some(username);
        Ok(())
    }

    /// Find the live slot bound to `name` (exact, case-sensitive match)
    pub fn lookup_by_username(&self, name: &str) -> Option<ClientId> {
        self.live()
            .find(|c| c.username.as_ref().is_some_and(|u| u.as_str() == name))
            .map(|c| c.id)
    }

    /// Copy out every live slot
    pub fn snapshot_live(&self) -> Vec<LiveClient> {
        self.live()
            .map(|c| LiveClient {
                id: c.id,
                handle: c.handle.clone(),
                username: c.username.clone(),
            })
            .collect()
    }

    /// Get a live client by id
    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Iterate over live clients in slot order
    pub fn live(&self) -> impl Iterator<Item = &Client> {
        self.slots.iter().flatten()
    }

    /// Number of live clients
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of allocated slots, live or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Grow the table geometrically, keeping every record in its slot
    fn grow(&mut self) -> Result<(), RegistryError> {
        let old = self.slots.len();
        let new = INITIAL_CAPACITY.max(old * 3 / 2);

        self.slots
            .try_reserve_exact(new - old)
            .map_err(|_| RegistryError::AllocFailure)?;
        self.slots.resize_with(new, || None);
        Ok(())
    }
}
