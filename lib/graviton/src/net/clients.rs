use hashbrown::HashMap;
use indexmap::IndexMap;
use photon::ClientId;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Book-keeping for one remote endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ClientEndpoint {
    pub addr: SocketAddr,
    pub last_seen: Instant,
}

/// Maps monotone client ids to endpoints and back. Gameplay code refers to
/// clients only by id; bare socket addresses stay inside the net layer.
pub struct ClientRegistry {
    clients: IndexMap<ClientId, ClientEndpoint>,
    by_addr: HashMap<SocketAddr, ClientId>,
    next_id: ClientId,
}

impl ClientRegistry {
    pub fn new() -> ClientRegistry {
        ClientRegistry {
            clients: IndexMap::new(),
            by_addr: HashMap::new(),
            next_id: 1,
        }
    }

    /// Returns the id for the endpoint, assigning the next free one to an
    /// unseen address. Re-registering refreshes the activity timestamp.
    pub fn register(&mut self, addr: SocketAddr, now: Instant) -> (ClientId, bool) {
        if let Some(&id) = self.by_addr.get(&addr) {
            if let Some(client) = self.clients.get_mut(&id) {
                client.last_seen = now;
            }
            return (id, false);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.clients.insert(
            id,
            ClientEndpoint {
                addr,
                last_seen: now,
            },
        );
        self.by_addr.insert(addr, id);

        (id, true)
    }

    #[inline]
    pub fn lookup_addr(&self, id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&id).map(|client| client.addr)
    }

    #[inline]
    pub fn lookup_id(&self, addr: &SocketAddr) -> Option<ClientId> {
        self.by_addr.get(addr).copied()
    }

    pub fn remove(&mut self, id: ClientId) -> Option<ClientEndpoint> {
        let client = self.clients.shift_remove(&id)?;
        self.by_addr.remove(&client.addr);
        Some(client)
    }

    /// Evicts every client idle longer than `timeout`, returning their ids
    /// so upper layers can dispose of per-client state.
    pub fn remove_inactive(&mut self, timeout: Duration, now: Instant) -> Vec<ClientId> {
        let expired: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| now.duration_since(client.last_seen) > timeout)
            .map(|(&id, _)| id)
            .collect();

        for &id in &expired {
            self.remove(id);
        }

        expired
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.clients.values().map(|client| client.addr).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clients.len()
    }
}
