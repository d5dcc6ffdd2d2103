//! Single-owner state machine behind the peer service.
//!
//! The engine never touches a socket. Every entry point takes the current
//! time and returns the [`NetAction`]s the runtime must perform, while
//! application-facing [`PeerEvent`]s accumulate in an outbox drained with
//! [`PeerEngine::drain_events`].

mod inbound;
mod outbound;

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::conference::ConferenceRegistry;
use crate::connection_manager::{
    ConnectionRecord, ConnectionTable, PendingQueues, conn_state::ConnId,
};
use crate::core::peer_command::PeerCommand;
use crate::core::send_error::SendError;
use crate::discovery::{
    DiscoveryPacket, PeerRecord, PeerTable, Upsert, discovery_packet::OFFLINE_STATUS,
};
use crate::log::log_sink::LogSink;
use crate::media::{MediaKind, sequence_counter::SequenceSpace};
use crate::signaling::{ContactEntry, PeerEvent, RateLimiter};
use crate::transport::net_action::{CloseReason, NetAction};
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

/// Status advertised right after start.
pub const DEFAULT_STATUS: &str = "Online";

/// What this peer announces about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub username: String,
    pub status: String,
    pub dialable_number: String,
    /// Port of the connection listener, advertised as `wsPort`.
    pub ws_port: u16,
}

impl LocalIdentity {
    pub fn new(username: impl Into<String>, ws_port: u16, dialable_number: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            status: DEFAULT_STATUS.to_owned(),
            dialable_number: dialable_number.into(),
            ws_port,
        }
    }
}

pub struct PeerEngine {
    me: LocalIdentity,
    peers: PeerTable,
    conns: ConnectionTable,
    pending: PendingQueues,
    rate: RateLimiter,
    conferences: ConferenceRegistry,
    /// Point-to-point frame counters keyed by (peer, kind).
    peer_seq: SequenceSpace<(String, MediaKind)>,
    /// Conference frame counters keyed by (conference id, kind).
    conf_seq: SequenceSpace<(String, MediaKind)>,
    max_envelope_bytes: usize,
    running: bool,
    outbox: Vec<PeerEvent>,
    log: Arc<dyn LogSink>,
}

impl PeerEngine {
    pub fn new(me: LocalIdentity, cfg: &ServiceConfig, log: Arc<dyn LogSink>) -> Self {
        Self {
            me,
            peers: PeerTable::new(cfg.discovery.liveness_ms),
            conns: ConnectionTable::new(),
            pending: PendingQueues::new(),
            rate: RateLimiter::new(
                cfg.signaling.rate_limit_count,
                cfg.signaling.rate_limit_window_ms,
            ),
            conferences: ConferenceRegistry::new(),
            peer_seq: SequenceSpace::new(),
            conf_seq: SequenceSpace::new(),
            max_envelope_bytes: cfg.signaling.max_envelope_bytes,
            running: false,
            outbox: Vec::new(),
            log,
        }
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Announce presence and report `Connected`. No-op when running.
    pub fn start(&mut self) -> Vec<NetAction> {
        if self.running {
            return Vec::new();
        }
        self.running = true;
        sink_info!(
            self.log,
            "[Peer] {} online on ws port {} ({})",
            self.me.username,
            self.me.ws_port,
            self.me.dialable_number
        );
        self.emit(PeerEvent::Connected);
        vec![self.announce_action()]
    }

    /// Announce `Offline`, close every connection and forget all peer state.
    /// Idempotent.
    pub fn stop(&mut self) -> Vec<NetAction> {
        if !self.running {
            return Vec::new();
        }
        let mut actions = vec![NetAction::Announce {
            payload: self.packet_with_status(OFFLINE_STATUS).to_bytes(),
        }];
        actions.extend(self.conns.ids().into_iter().map(|conn| NetAction::Close {
            conn,
            reason: CloseReason::normal("peer shutting down"),
        }));

        let dropped = self.pending.total();
        if dropped > 0 {
            sink_debug!(self.log, "[Peer] dropping {} queued envelopes on stop", dropped);
        }
        self.conns.clear();
        self.pending.clear();
        self.peers.clear();
        self.rate.clear();
        self.conferences.clear();
        self.peer_seq.clear();
        self.conf_seq.clear();
        self.running = false;

        sink_info!(self.log, "[Peer] {} offline", self.me.username);
        self.emit(PeerEvent::Disconnected);
        actions
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    // ---------------------------------------------------------------
    // Presence
    // ---------------------------------------------------------------

    pub fn on_heartbeat(&mut self) -> Vec<NetAction> {
        if !self.running {
            return Vec::new();
        }
        vec![self.announce_action()]
    }

    /// Purge peers silent for longer than the liveness window. Each purged
    /// peer yields one `Offline` presence change; one contact list follows.
    pub fn on_sweep(&mut self, now_ms: u64) -> Vec<NetAction> {
        if !self.running {
            return Vec::new();
        }
        let purged = self.peers.sweep(now_ms);
        let mut actions = Vec::new();
        for rec in &purged {
            sink_info!(self.log, "[Discovery] peer {} timed out", rec.username);
            actions.extend(self.forget_peer(&rec.username, "peer timed out"));
        }
        if !purged.is_empty() {
            self.emit_contact_list();
        }
        actions
    }

    /// Handle one discovery datagram received from `from`.
    pub fn on_discovery_datagram(&mut self, payload: &[u8], from: IpAddr, now_ms: u64) -> Vec<NetAction> {
        if !self.running {
            return Vec::new();
        }
        let packet = match DiscoveryPacket::parse(payload) {
            Ok(p) => p,
            Err(e) => {
                sink_trace!(self.log, "[Discovery] ignoring datagram from {}: {}", from, e);
                return Vec::new();
            }
        };
        if packet.username == self.me.username {
            return Vec::new();
        }

        if packet.status == OFFLINE_STATUS {
            if self.peers.remove(&packet.username).is_none() {
                return Vec::new();
            }
            sink_info!(self.log, "[Discovery] peer {} went offline", packet.username);
            let actions = self.forget_peer(&packet.username, "peer went offline");
            self.emit_contact_list();
            return actions;
        }

        let upsert = self.peers.upsert(&packet, from, now_ms);
        if upsert == Upsert::New {
            sink_info!(
                self.log,
                "[Discovery] discovered {} at {}:{} ({})",
                packet.username,
                from,
                packet.ws_port,
                packet.status
            );
        }
        if upsert.is_presence_change() {
            self.emit(PeerEvent::PresenceChanged {
                peer: packet.username.clone(),
                status: packet.status.clone(),
            });
            self.emit_contact_list();
        }
        Vec::new()
    }

    /// Unicast our announcement to a host outside the multicast scope.
    pub fn probe(&mut self, ip: IpAddr) -> Vec<NetAction> {
        if !self.running {
            return Vec::new();
        }
        sink_debug!(self.log, "[Discovery] probing {}", ip);
        vec![NetAction::Probe {
            ip,
            payload: self.packet_with_status(&self.me.status).to_bytes(),
        }]
    }

    /// Change the advertised status; announced immediately.
    pub fn set_status(&mut self, status: &str) -> Vec<NetAction> {
        self.me.status = status.to_owned();
        if !self.running {
            return Vec::new();
        }
        vec![self.announce_action()]
    }

    pub fn request_contacts(&mut self) {
        self.emit_contact_list();
    }

    /// Report `ContactAdded` when `peer` is currently discovered.
    pub fn add_contact(&mut self, peer: &str) {
        if self.peers.contains(peer) {
            self.emit(PeerEvent::ContactAdded {
                peer: peer.to_owned(),
            });
        } else {
            sink_debug!(self.log, "[Peer] add_contact: {} not discovered", peer);
        }
    }

    // ---------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------

    /// Run one facade request. Refusals are already reported as events or
    /// log lines, so only the actions come back.
    pub fn apply_command(&mut self, cmd: PeerCommand, now_ms: u64) -> Vec<NetAction> {
        let result = match cmd {
            PeerCommand::SetStatus(status) => return self.set_status(&status),
            PeerCommand::Probe(ip) => return self.probe(ip),
            PeerCommand::RequestContacts => {
                self.request_contacts();
                return Vec::new();
            }
            PeerCommand::AddContact(peer) => {
                self.add_contact(&peer);
                return Vec::new();
            }
            PeerCommand::Message { to, text } => self.send_message(&to, &text, now_ms),
            PeerCommand::Typing { to } => self.send_typing(&to, now_ms),
            PeerCommand::FileOffer {
                to,
                file_name,
                file_size,
            } => self.send_file_offer(&to, &file_name, file_size, now_ms),
            PeerCommand::FileData {
                to,
                file_name,
                data,
            } => self.send_file_data(&to, &file_name, &data, now_ms),
            PeerCommand::CallOffer { to, call_id } => self.send_call_offer(&to, &call_id, now_ms),
            PeerCommand::CallAccept { to, call_id } => self.send_call_accept(&to, &call_id, now_ms),
            PeerCommand::CallReject { to, call_id } => self.send_call_reject(&to, &call_id, now_ms),
            PeerCommand::CallEnd { to, call_id } => self.send_call_end(&to, &call_id, now_ms),
            PeerCommand::GroupCreate {
                to,
                group_id,
                group_name,
                members,
            } => self.send_group_create(&to, &group_id, &group_name, members, now_ms),
            PeerCommand::GroupMessage { to, group_id, text } => {
                self.send_group_message(&to, &group_id, &text, now_ms)
            }
            PeerCommand::GroupTyping { to, group_id } => {
                self.send_group_typing(&to, &group_id, now_ms)
            }
            PeerCommand::GroupInvite {
                to,
                group_id,
                group_name,
                members,
            } => self.send_group_invite(&to, &group_id, &group_name, members, now_ms),
            PeerCommand::GroupLeave { to, group_id } => {
                self.send_group_leave(&to, &group_id, now_ms)
            }
            PeerCommand::ContactShare { to, contact } => {
                self.send_contact_share(&to, contact, now_ms)
            }
            PeerCommand::Audio { to, payload } => self.send_audio(&to, payload, now_ms),
            PeerCommand::Video { to, payload } => self.send_video(&to, payload, now_ms),
            PeerCommand::CreateConference {
                participants,
                reply,
            } => {
                let (result, actions) = match self.create_conference(participants, now_ms) {
                    Ok((id, actions)) => (Ok(id), actions),
                    Err(e) => (Err(e), Vec::new()),
                };
                let _ = reply.send(result);
                return actions;
            }
            PeerCommand::JoinConference { conference_id } => {
                self.join_conference(&conference_id, now_ms)
            }
            PeerCommand::LeaveConference { conference_id } => {
                self.leave_conference(&conference_id, now_ms)
            }
            PeerCommand::ConferenceAudio {
                conference_id,
                payload,
            } => self.send_conference_audio(&conference_id, payload, now_ms),
            PeerCommand::ConferenceVideo {
                conference_id,
                payload,
            } => self.send_conference_video(&conference_id, payload, now_ms),
        };
        match result {
            Ok(actions) => actions,
            Err(e) => {
                sink_debug!(self.log, "[Peer] request refused: {}", e);
                Vec::new()
            }
        }
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    #[must_use]
    pub fn identity(&self) -> &LocalIdentity {
        &self.me
    }

    #[must_use]
    pub fn peer(&self, username: &str) -> Option<&PeerRecord> {
        self.peers.get(username)
    }

    /// Discovered peers sorted by username.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.peers.snapshot()
    }

    #[must_use]
    pub fn connection(&self, conn: ConnId) -> Option<&ConnectionRecord> {
        self.conns.get(conn)
    }

    #[must_use]
    pub fn outbound_for(&self, peer: &str) -> Option<&ConnectionRecord> {
        self.conns.outbound_for(peer)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    #[must_use]
    pub fn pending_len(&self, peer: &str) -> usize {
        self.pending.len(peer)
    }

    #[must_use]
    pub fn conferences(&self) -> &ConferenceRegistry {
        &self.conferences
    }

    /// Take every event produced since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    fn emit(&mut self, ev: PeerEvent) {
        self.outbox.push(ev);
    }

    fn emit_contact_list(&mut self) {
        let list: Vec<ContactEntry> = self.peers.snapshot().iter().map(ContactEntry::from).collect();
        self.emit(PeerEvent::ContactList(list));
    }

    fn packet_with_status(&self, status: &str) -> DiscoveryPacket {
        DiscoveryPacket::new(
            self.me.username.clone(),
            status,
            self.me.ws_port,
            self.me.dialable_number.clone(),
        )
    }

    fn announce_action(&self) -> NetAction {
        NetAction::Announce {
            payload: self.packet_with_status(&self.me.status).to_bytes(),
        }
    }

    /// Tear down everything tied to a peer already removed from the table
    /// and report it offline.
    fn forget_peer(&mut self, peer: &str, why: &str) -> Vec<NetAction> {
        let mut actions = Vec::new();
        if let Some(rec) = self.conns.evict_outbound(peer) {
            actions.push(NetAction::Close {
                conn: rec.id,
                reason: CloseReason::normal(why),
            });
        }
        let dropped = self.pending.discard(peer);
        if dropped > 0 {
            sink_warn!(self.log, "[Peer] dropped {} queued envelopes for {}", dropped, peer);
        }
        self.rate.forget(peer);
        self.peer_seq.forget_where(|(p, _)| p == peer);
        for ended in self.conferences.remove_user_everywhere(peer) {
            self.conf_seq.forget_where(|(c, _)| *c == ended);
        }
        self.emit(PeerEvent::PresenceChanged {
            peer: peer.to_owned(),
            status: OFFLINE_STATUS.to_owned(),
        });
        actions
    }

    fn require_running(&self) -> Result<(), SendError> {
        if self.running {
            Ok(())
        } else {
            Err(SendError::NotRunning)
        }
    }

    fn unreachable(&mut self, peer: &str) -> SendError {
        sink_warn!(self.log, "[Peer] {} is not reachable", peer);
        self.emit(PeerEvent::PeerUnreachable {
            peer: peer.to_owned(),
        });
        SendError::PeerUnreachable(peer.to_owned())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use std::net::Ipv4Addr;

    const BOB_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));

    fn engine() -> PeerEngine {
        let mut e = PeerEngine::new(
            LocalIdentity::new("alice", 5000, "SKP-11111"),
            &ServiceConfig::default(),
            Arc::new(NoopLogSink),
        );
        e.start();
        e.drain_events();
        e
    }

    fn bob(status: &str) -> Vec<u8> {
        DiscoveryPacket::new("bob", status, 5001, "SKP-22222").to_bytes()
    }

    #[test]
    fn start_announces_and_reports_connected_once() {
        let mut e = PeerEngine::new(
            LocalIdentity::new("alice", 5000, "SKP-11111"),
            &ServiceConfig::default(),
            Arc::new(NoopLogSink),
        );
        let actions = e.start();
        assert_eq!(actions.len(), 1);
        let NetAction::Announce { payload } = &actions[0] else {
            panic!("expected announce, got {actions:?}");
        };
        let packet = DiscoveryPacket::parse(payload).unwrap();
        assert_eq!(packet.username, "alice");
        assert_eq!(packet.status, DEFAULT_STATUS);
        assert_eq!(packet.ws_port, 5000);
        assert!(e.start().is_empty());
        assert_eq!(e.drain_events(), vec![PeerEvent::Connected]);
    }

    #[test]
    fn own_announcements_are_ignored() {
        let mut e = engine();
        let own = DiscoveryPacket::new("alice", "Online", 5000, "SKP-11111").to_bytes();
        e.on_discovery_datagram(&own, BOB_IP, 1_000);
        assert!(e.peers().is_empty());
        assert!(e.drain_events().is_empty());
    }

    #[test]
    fn refresh_without_status_change_is_silent() {
        let mut e = engine();
        e.on_discovery_datagram(&bob("Online"), BOB_IP, 1_000);
        assert_eq!(e.drain_events().len(), 2);

        e.on_discovery_datagram(&bob("Online"), BOB_IP, 2_000);
        assert!(e.drain_events().is_empty());
        assert_eq!(e.peer("bob").unwrap().last_seen_ms, 2_000);

        e.on_discovery_datagram(&bob("Away"), BOB_IP, 3_000);
        let events = e.drain_events();
        assert_eq!(
            events[0],
            PeerEvent::PresenceChanged {
                peer: "bob".into(),
                status: "Away".into()
            }
        );
        assert!(matches!(&events[1], PeerEvent::ContactList(list) if list[0].status == "Away"));
    }

    #[test]
    fn offline_announcement_removes_peer_immediately() {
        let mut e = engine();
        e.on_discovery_datagram(&bob("Online"), BOB_IP, 1_000);
        e.drain_events();

        e.on_discovery_datagram(&bob(OFFLINE_STATUS), BOB_IP, 1_500);
        assert!(e.peer("bob").is_none());
        let events = e.drain_events();
        assert_eq!(
            events,
            vec![
                PeerEvent::PresenceChanged {
                    peer: "bob".into(),
                    status: OFFLINE_STATUS.into()
                },
                PeerEvent::ContactList(Vec::new()),
            ]
        );

        // A second offline packet for an unknown peer changes nothing.
        e.on_discovery_datagram(&bob(OFFLINE_STATUS), BOB_IP, 1_600);
        assert!(e.drain_events().is_empty());
    }

    #[test]
    fn set_status_reannounces_with_new_status() {
        let mut e = engine();
        let actions = e.set_status("Busy");
        let NetAction::Announce { payload } = &actions[0] else {
            panic!("expected announce");
        };
        assert_eq!(DiscoveryPacket::parse(payload).unwrap().status, "Busy");
        assert_eq!(e.identity().status, "Busy");
    }

    #[test]
    fn probe_targets_one_host() {
        let mut e = engine();
        let actions = e.probe(BOB_IP);
        assert!(matches!(&actions[..], [NetAction::Probe { ip, .. }] if *ip == BOB_IP));
    }

    #[test]
    fn add_contact_only_for_discovered_peers() {
        let mut e = engine();
        e.add_contact("bob");
        assert!(e.drain_events().is_empty());

        e.on_discovery_datagram(&bob("Online"), BOB_IP, 1_000);
        e.drain_events();
        e.add_contact("bob");
        assert_eq!(
            e.drain_events(),
            vec![PeerEvent::ContactAdded { peer: "bob".into() }]
        );
    }

    #[test]
    fn stop_announces_offline_and_is_idempotent() {
        let mut e = engine();
        e.on_discovery_datagram(&bob("Online"), BOB_IP, 1_000);
        e.drain_events();

        let actions = e.stop();
        let NetAction::Announce { payload } = &actions[0] else {
            panic!("expected offline announce first");
        };
        assert_eq!(DiscoveryPacket::parse(payload).unwrap().status, OFFLINE_STATUS);
        assert!(e.peers().is_empty());
        assert_eq!(e.drain_events(), vec![PeerEvent::Disconnected]);

        assert!(e.stop().is_empty());
        assert!(e.drain_events().is_empty());
        assert!(e.on_heartbeat().is_empty());
    }
}
