use std::net::{SocketAddr, TcpStream};

use bytes::Bytes;

use crate::connection_manager::conn_state::ConnId;

/// What connection workers and the listener report to the event loop.
#[derive(Debug)]
pub enum TransportEvent {
    /// Accepted TCP stream; the loop assigns an id and starts its worker.
    Incoming {
        stream: TcpStream,
        remote: SocketAddr,
    },
    /// Outbound handshake completed.
    Opened { conn: ConnId },
    ConnectFailed { conn: ConnId, reason: String },
    Text { conn: ConnId, text: String },
    Binary { conn: ConnId, data: Bytes },
    Closed { conn: ConnId, reason: String },
}
