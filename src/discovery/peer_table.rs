use std::collections::HashMap;
use std::net::IpAddr;

use crate::discovery::{
    discovery_packet::DiscoveryPacket,
    peer_record::{PeerRecord, normalize_ip},
};

/// What an announcement changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    New,
    StatusChanged,
    /// Only `last_seen_ms` (and possibly address/port) moved.
    Refreshed,
}

impl Upsert {
    /// Presence is reported for new peers and status changes only.
    #[must_use]
    pub fn is_presence_change(self) -> bool {
        !matches!(self, Self::Refreshed)
    }
}

/// Recently seen peers keyed by username.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<String, PeerRecord>,
    liveness_ms: u64,
}

impl PeerTable {
    #[must_use]
    pub fn new(liveness_ms: u64) -> Self {
        Self {
            peers: HashMap::new(),
            liveness_ms,
        }
    }

    /// Record an announcement received from `source`.
    pub fn upsert(&mut self, packet: &DiscoveryPacket, source: IpAddr, now_ms: u64) -> Upsert {
        let address = normalize_ip(source);
        match self.peers.get_mut(&packet.username) {
            Some(rec) => {
                let changed = rec.status != packet.status;
                rec.status.clone_from(&packet.status);
                rec.dialable_number.clone_from(&packet.dialable_number);
                rec.address = address;
                rec.listen_port = packet.ws_port;
                rec.last_seen_ms = now_ms;
                if changed {
                    Upsert::StatusChanged
                } else {
                    Upsert::Refreshed
                }
            }
            None => {
                self.peers.insert(
                    packet.username.clone(),
                    PeerRecord {
                        username: packet.username.clone(),
                        status: packet.status.clone(),
                        dialable_number: packet.dialable_number.clone(),
                        address,
                        listen_port: packet.ws_port,
                        last_seen_ms: now_ms,
                    },
                );
                Upsert::New
            }
        }
    }

    /// Remove and return every record older than the liveness window,
    /// sorted by username.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<PeerRecord> {
        let liveness = self.liveness_ms;
        let expired: Vec<String> = self
            .peers
            .values()
            .filter(|rec| rec.is_expired(now_ms, liveness))
            .map(|rec| rec.username.clone())
            .collect();

        let mut purged: Vec<PeerRecord> = expired
            .iter()
            .filter_map(|name| self.peers.remove(name))
            .collect();
        purged.sort_by(|a, b| a.username.cmp(&b.username));
        purged
    }

    #[must_use]
    pub fn get(&self, username: &str) -> Option<&PeerRecord> {
        self.peers.get(username)
    }

    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.peers.contains_key(username)
    }

    pub fn remove(&mut self, username: &str) -> Option<PeerRecord> {
        self.peers.remove(username)
    }

    /// All records sorted by username.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let mut all: Vec<PeerRecord> = self.peers.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    #[must_use]
    pub fn liveness_ms(&self) -> u64 {
        self.liveness_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const BOB_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    fn announce(name: &str, status: &str) -> DiscoveryPacket {
        DiscoveryPacket::new(name, status, 5001, "SKP-10001")
    }

    #[test]
    fn new_then_refresh_then_status_change() {
        let mut t = PeerTable::new(15_000);
        assert_eq!(t.upsert(&announce("bob", "Online"), BOB_IP, 0), Upsert::New);
        assert_eq!(t.upsert(&announce("bob", "Online"), BOB_IP, 5_000), Upsert::Refreshed);
        assert_eq!(t.get("bob").map(|r| r.last_seen_ms), Some(5_000));
        let up = t.upsert(&announce("bob", "Away"), BOB_IP, 6_000);
        assert_eq!(up, Upsert::StatusChanged);
        assert!(up.is_presence_change());
        assert!(!Upsert::Refreshed.is_presence_change());
    }

    #[test]
    fn mapped_source_is_stored_as_v4() {
        let mut t = PeerTable::new(15_000);
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 168, 1, 20).to_ipv6_mapped());
        t.upsert(&announce("bob", "Online"), mapped, 0);
        assert_eq!(t.get("bob").map(|r| r.address), Some(BOB_IP));
    }

    #[test]
    fn sweep_purges_only_stale_records() {
        let mut t = PeerTable::new(15_000);
        t.upsert(&announce("carol", "Online"), BOB_IP, 0);
        t.upsert(&announce("bob", "Online"), BOB_IP, 0);
        t.upsert(&announce("dave", "Online"), BOB_IP, 10_000);

        assert!(t.sweep(15_000).is_empty());
        let purged = t.sweep(15_001);
        let names: Vec<&str> = purged.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, ["bob", "carol"]);
        assert!(t.contains("dave"));
        assert!(t.sweep(15_002).is_empty(), "purged peers are reported once");
    }
}
