use std::net::{IpAddr, SocketAddr};

/// A LAN peer as last announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub username: String,
    pub status: String,
    pub dialable_number: String,
    pub address: IpAddr,
    /// WebSocket listen port from the announcement's `wsPort`.
    pub listen_port: u16,
    pub last_seen_ms: u64,
}

impl PeerRecord {
    #[must_use]
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.listen_port)
    }

    /// `ws://address:port` for the outbound connection.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.endpoint())
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64, liveness_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) > liveness_ms
    }
}

/// Plain IPv4 for IPv4-mapped IPv6 sources (`::ffff:a.b.c.d`).
#[must_use]
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}
