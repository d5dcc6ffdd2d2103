use std::collections::HashMap;
use std::net::SocketAddr;

use crate::connection_manager::{
    conn_state::{ConnId, ConnState, Direction},
    connection_record::ConnectionRecord,
};

/// Every live connection plus the per-peer outbound reuse cache.
#[derive(Debug)]
pub struct ConnectionTable {
    conns: HashMap<ConnId, ConnectionRecord>,
    outbound: HashMap<String, ConnId>,
    next_id: ConnId,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self {
            conns: HashMap::new(),
            outbound: HashMap::new(),
            next_id: 1,
        }
    }
}

impl ConnectionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> ConnId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Cached outbound connection for `peer`, if any.
    #[must_use]
    pub fn outbound_for(&self, peer: &str) -> Option<&ConnectionRecord> {
        self.outbound.get(peer).and_then(|id| self.conns.get(id))
    }

    /// Register a new outbound connection in `Connecting`, bound to `peer`,
    /// replacing whatever the cache held.
    pub fn open_outbound(&mut self, peer: &str, remote: SocketAddr, now_ms: u64) -> ConnId {
        let id = self.alloc_id();
        self.conns.insert(
            id,
            ConnectionRecord {
                id,
                direction: Direction::Outbound {
                    peer: peer.to_owned(),
                },
                state: ConnState::Connecting,
                bound_peer: Some(peer.to_owned()),
                remote: Some(remote),
                opened_at_ms: now_ms,
            },
        );
        self.outbound.insert(peer.to_owned(), id);
        id
    }

    /// Register an accepted connection: open but unidentified.
    pub fn accept_inbound(&mut self, remote: Option<SocketAddr>, now_ms: u64) -> ConnId {
        let id = self.alloc_id();
        self.conns.insert(
            id,
            ConnectionRecord {
                id,
                direction: Direction::Inbound,
                state: ConnState::Open,
                bound_peer: None,
                remote,
                opened_at_ms: now_ms,
            },
        );
        id
    }

    #[must_use]
    pub fn get(&self, id: ConnId) -> Option<&ConnectionRecord> {
        self.conns.get(&id)
    }

    pub fn set_state(&mut self, id: ConnId, state: ConnState) -> bool {
        match self.conns.get_mut(&id) {
            Some(rec) => {
                rec.state = state;
                true
            }
            None => false,
        }
    }

    /// Bind an inbound connection to the identity it claimed.
    pub fn bind(&mut self, id: ConnId, username: &str) -> bool {
        match self.conns.get_mut(&id) {
            Some(rec) => {
                rec.bound_peer = Some(username.to_owned());
                if rec.state == ConnState::Open && !rec.is_outbound() {
                    rec.state = ConnState::Identified;
                }
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn bound_name(&self, id: ConnId) -> Option<&str> {
        self.conns.get(&id).and_then(|rec| rec.bound_peer.as_deref())
    }

    /// Forget a connection. If it was the cached outbound one for its peer,
    /// the cache entry goes too.
    pub fn remove(&mut self, id: ConnId) -> Option<ConnectionRecord> {
        let rec = self.conns.remove(&id)?;
        if let Direction::Outbound { peer } = &rec.direction {
            if self.outbound.get(peer) == Some(&id) {
                self.outbound.remove(peer);
            }
        }
        Some(rec)
    }

    /// Drop the cached outbound connection for `peer`.
    pub fn evict_outbound(&mut self, peer: &str) -> Option<ConnectionRecord> {
        let id = self.outbound.remove(peer)?;
        self.conns.remove(&id)
    }

    /// Ids of inbound connections bound to `peer`.
    #[must_use]
    pub fn inbound_for(&self, peer: &str) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self
            .conns
            .values()
            .filter(|rec| !rec.is_outbound() && rec.bound_peer.as_deref() == Some(peer))
            .map(|rec| rec.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Every id, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self.conns.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    #[must_use]
    pub fn outbound_count(&self) -> usize {
        self.outbound.len()
    }

    pub fn clear(&mut self) {
        self.conns.clear();
        self.outbound.clear();
    }
}
