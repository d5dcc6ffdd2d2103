use std::net::SocketAddr;

use crate::connection_manager::conn_state::{ConnId, ConnState, Direction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: ConnId,
    pub direction: Direction,
    pub state: ConnState,
    /// Username this connection speaks for. Outbound connections are bound
    /// to their target at creation; inbound ones on `identify`.
    pub bound_peer: Option<String>,
    pub remote: Option<SocketAddr>,
    pub opened_at_ms: u64,
}

impl ConnectionRecord {
    #[must_use]
    pub fn is_outbound(&self) -> bool {
        matches!(self.direction, Direction::Outbound { .. })
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnState::Identified | ConnState::Open)
    }

    /// Still worth reusing: open, or about to be.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state != ConnState::Closed
    }
}
