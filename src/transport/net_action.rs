use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;

use crate::connection_manager::conn_state::ConnId;

/// Reason attached to a policy-violation close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub policy_violation: bool,
    pub text: String,
}

impl CloseReason {
    pub fn policy(text: impl Into<String>) -> Self {
        Self {
            policy_violation: true,
            text: text.into(),
        }
    }

    pub fn normal(text: impl Into<String>) -> Self {
        Self {
            policy_violation: false,
            text: text.into(),
        }
    }
}

/// I/O the engine asks the runtime to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetAction {
    /// Open an outbound WebSocket to `url` for connection `conn`.
    Connect {
        conn: ConnId,
        peer: String,
        addr: SocketAddr,
        url: String,
    },
    SendText {
        conn: ConnId,
        text: String,
    },
    SendBinary {
        conn: ConnId,
        data: Bytes,
    },
    Close {
        conn: ConnId,
        reason: CloseReason,
    },
    /// Multicast + broadcast a discovery datagram.
    Announce {
        payload: Vec<u8>,
    },
    /// Unicast a discovery datagram to one host.
    Probe {
        ip: IpAddr,
        payload: Vec<u8>,
    },
}

impl NetAction {
    /// Connection this action targets, if any.
    #[must_use]
    pub fn conn(&self) -> Option<ConnId> {
        match self {
            Self::Connect { conn, .. }
            | Self::SendText { conn, .. }
            | Self::SendBinary { conn, .. }
            | Self::Close { conn, .. } => Some(*conn),
            Self::Announce { .. } | Self::Probe { .. } => None,
        }
    }
}
