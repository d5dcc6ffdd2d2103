/// Identifier of one duplex connection, inbound or outbound.
pub type ConnId = u64;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Outbound: TCP connect and WebSocket handshake in progress.
    Connecting,
    /// Outbound: our `identify` has been queued on the open socket.
    /// Inbound: the remote side has identified.
    Identified,
    /// Usable for sends; pending envelopes have been flushed.
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Opened by us towards `peer`.
    Outbound { peer: String },
    /// Accepted by our listener.
    Inbound,
}
