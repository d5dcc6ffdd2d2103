//! Transport callbacks: connection lifecycle and inbound traffic.

use std::net::SocketAddr;

use bytes::Bytes;

use super::PeerEngine;
use crate::connection_manager::{ConnId, ConnState, Direction};
use crate::media::{MediaFrame, MediaKind};
use crate::signaling::envelope::Envelope;
use crate::signaling::envelope_codec::{decode_envelope, decode_file_data};
use crate::signaling::{PeerEvent, ProtoError};
use crate::transport::net_action::{CloseReason, NetAction};
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

impl PeerEngine {
    /// Register an accepted socket; it stays unbound until `identify`.
    pub fn on_inbound(&mut self, remote: SocketAddr, now_ms: u64) -> ConnId {
        let conn = self.conns.accept_inbound(Some(remote), now_ms);
        sink_debug!(self.log, "[Peer] inbound conn {} from {}", conn, remote);
        conn
    }

    /// Outbound handshake done: identify first, then flush the queue.
    pub fn on_connected(&mut self, conn: ConnId) -> Vec<NetAction> {
        let Some(Direction::Outbound { peer }) = self.conns.get(conn).map(|rec| rec.direction.clone()) else {
            return Vec::new();
        };
        let identify = Envelope::Identify {
            username: self.me.username.clone(),
        };
        let text = match identify.to_json() {
            Ok(text) => text,
            Err(e) => {
                sink_warn!(self.log, "[Peer] cannot encode identify: {}", e);
                return vec![NetAction::Close {
                    conn,
                    reason: CloseReason::normal("identify failed"),
                }];
            }
        };
        let mut actions = vec![NetAction::SendText { conn, text }];
        self.conns.set_state(conn, ConnState::Identified);

        let queued = self.pending.take(&peer);
        sink_debug!(
            self.log,
            "[Peer] conn {} to {} open, flushing {} envelopes",
            conn,
            peer,
            queued.len()
        );
        actions.extend(queued.into_iter().map(|text| NetAction::SendText { conn, text }));
        self.conns.set_state(conn, ConnState::Open);
        actions
    }

    /// Outbound connect or handshake failed; queued envelopes are lost.
    pub fn on_connect_failed(&mut self, conn: ConnId, reason: &str) {
        let Some(rec) = self.conns.remove(conn) else {
            return;
        };
        if let Direction::Outbound { peer } = rec.direction {
            let dropped = self.pending.discard(&peer);
            sink_warn!(
                self.log,
                "[Peer] connection to {} failed: {} ({} queued envelopes dropped)",
                peer,
                reason,
                dropped
            );
        }
    }

    pub fn on_closed(&mut self, conn: ConnId, reason: &str) {
        let Some(rec) = self.conns.remove(conn) else {
            return;
        };
        match rec.direction {
            Direction::Outbound { peer } if rec.state == ConnState::Connecting => {
                let dropped = self.pending.discard(&peer);
                sink_debug!(
                    self.log,
                    "[Peer] conn {} to {} closed before opening: {} ({} dropped)",
                    conn,
                    peer,
                    reason,
                    dropped
                );
            }
            Direction::Outbound { peer } => {
                sink_info!(self.log, "[Peer] connection to {} lost: {}", peer, reason);
                self.emit(PeerEvent::ConnectionLost { peer });
            }
            Direction::Inbound => {
                sink_debug!(
                    self.log,
                    "[Peer] inbound conn {} ({}) closed: {}",
                    conn,
                    rec.bound_peer.as_deref().unwrap_or("unidentified"),
                    reason
                );
            }
        }
    }

    /// Inbound text: decode, identity gate, rate limit, dispatch.
    pub fn on_text(&mut self, conn: ConnId, text: &str, now_ms: u64) -> Vec<NetAction> {
        let env = match decode_envelope(text, self.max_envelope_bytes) {
            Ok(env) => env,
            Err(e @ ProtoError::TooLarge { .. }) => {
                sink_warn!(self.log, "[Signaling] conn {}: {}", conn, e);
                return Vec::new();
            }
            Err(e) => {
                sink_debug!(self.log, "[Signaling] conn {}: dropping envelope: {}", conn, e);
                return Vec::new();
            }
        };
        let Some(rec) = self.conns.get(conn) else {
            return Vec::new();
        };
        let outbound = rec.is_outbound();
        let bound = rec.bound_peer.clone();

        if let Envelope::Identify { username } = env {
            if outbound {
                sink_debug!(self.log, "[Signaling] conn {}: ignoring identify on outbound", conn);
                return Vec::new();
            }
            if username.is_empty() {
                sink_warn!(self.log, "[Signaling] conn {}: empty identify, closing", conn);
                self.conns.remove(conn);
                return vec![NetAction::Close {
                    conn,
                    reason: CloseReason::policy("Empty username"),
                }];
            }
            if !self.peers.contains(&username) {
                sink_debug!(self.log, "[Signaling] conn {} identified as undiscovered {}", conn, username);
            }
            sink_info!(self.log, "[Signaling] conn {} identified as {}", conn, username);
            self.conns.bind(conn, &username);
            return Vec::new();
        }

        let Some(bound) = bound else {
            sink_warn!(
                self.log,
                "[Signaling] conn {}: {} before identify, dropped",
                conn,
                env.kind()
            );
            return Vec::new();
        };
        if env.from() != Some(bound.as_str()) {
            sink_warn!(
                self.log,
                "[Signaling] conn {}: sender {:?} does not match {}, dropped",
                conn,
                env.from(),
                bound
            );
            return Vec::new();
        }
        if !self.rate.admit(&bound, now_ms) {
            sink_warn!(self.log, "[Signaling] rate limit exceeded by {}", bound);
            return Vec::new();
        }
        self.dispatch(conn, env, now_ms)
    }

    fn dispatch(&mut self, conn: ConnId, env: Envelope, now_ms: u64) -> Vec<NetAction> {
        let event = match env {
            Envelope::Identify { .. } => return Vec::new(),
            Envelope::Message {
                from,
                text,
                timestamp,
            } => {
                let ack = Envelope::MessageAck {
                    from: self.me.username.clone(),
                    text: text.clone(),
                };
                self.emit(PeerEvent::MessageReceived {
                    from,
                    text,
                    timestamp,
                });
                return match ack.to_json() {
                    Ok(text) => vec![NetAction::SendText { conn, text }],
                    Err(_) => Vec::new(),
                };
            }
            Envelope::MessageAck { from, text } => PeerEvent::MessageAcknowledged { from, text },
            Envelope::Typing { from } => PeerEvent::Typing { from },
            Envelope::FileOffer {
                from,
                file_name,
                file_size,
            } => PeerEvent::FileOffer {
                from,
                file_name,
                file_size,
            },
            Envelope::FileData {
                from,
                file_name,
                data,
                ..
            } => match decode_file_data(&data) {
                Ok(bytes) => PeerEvent::FileData {
                    from,
                    file_name,
                    data: Bytes::from(bytes),
                },
                Err(e) => {
                    sink_warn!(self.log, "[Signaling] file {} from {}: {}", file_name, from, e);
                    return Vec::new();
                }
            },
            Envelope::CallOffer { from, call_id } => PeerEvent::CallOffer { from, call_id },
            Envelope::CallAccept { from, call_id } => PeerEvent::CallAccepted { from, call_id },
            Envelope::CallReject { from, call_id } => PeerEvent::CallRejected { from, call_id },
            Envelope::CallEnd { from, call_id } => PeerEvent::CallEnded { from, call_id },
            Envelope::GroupCreate {
                from,
                group_id,
                group_name,
                members,
            } => PeerEvent::GroupCreated {
                from,
                group_id,
                group_name,
                members,
            },
            Envelope::GroupMessage {
                from,
                group_id,
                text,
            } => PeerEvent::GroupMessage {
                from,
                group_id,
                text,
            },
            Envelope::GroupTyping { from, group_id } => PeerEvent::GroupTyping { from, group_id },
            Envelope::GroupInvite {
                from,
                group_id,
                group_name,
                members,
            } => PeerEvent::GroupInvite {
                from,
                group_id,
                group_name,
                members,
            },
            Envelope::GroupLeave { from, group_id } => PeerEvent::GroupLeft { from, group_id },
            Envelope::ContactShare {
                from,
                shared_contact,
            } => PeerEvent::ContactShared {
                from,
                contact: shared_contact,
            },
            Envelope::ConfCreate {
                from,
                conference_id,
                participants,
            } => {
                if conference_id.is_empty() {
                    sink_debug!(self.log, "[Conference] conf_create from {} without id", from);
                    return Vec::new();
                }
                let adopted = self
                    .conferences
                    .insert_with_id(
                        conference_id.clone(),
                        &from,
                        participants.iter().cloned(),
                        now_ms,
                    )
                    .is_some();
                if !adopted {
                    sink_debug!(
                        self.log,
                        "[Conference] conf_create from {} for known id {}; ignored",
                        from,
                        conference_id
                    );
                    return Vec::new();
                }
                PeerEvent::ConferenceCreated {
                    from,
                    conference_id,
                    participants,
                }
            }
            Envelope::ConfJoin {
                from,
                conference_id,
            } => {
                if let Err(e) = self.conferences.join(&conference_id, &from) {
                    sink_debug!(self.log, "[Conference] join from {}: {}", from, e);
                }
                PeerEvent::ConferenceJoined {
                    from,
                    conference_id,
                }
            }
            Envelope::ConfLeave {
                from,
                conference_id,
            } => {
                match self.conferences.leave(&conference_id, &from) {
                    Ok(true) => {
                        self.conf_seq.forget_where(|(c, _)| *c == conference_id);
                    }
                    Ok(false) => {}
                    Err(e) => sink_debug!(self.log, "[Conference] leave from {}: {}", from, e),
                }
                PeerEvent::ConferenceLeft {
                    from,
                    conference_id,
                }
            }
        };
        self.emit(event);
        Vec::new()
    }

    /// Inbound media frame. Dropped unless the connection has an identity.
    pub fn on_binary(&mut self, conn: ConnId, data: &Bytes) {
        let Some(from) = self.conns.bound_name(conn).map(str::to_owned) else {
            sink_trace!(self.log, "[Media] conn {}: binary before identify, dropped", conn);
            return;
        };
        let frame = match MediaFrame::parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                sink_trace!(self.log, "[Media] conn {} from {}: {}", conn, from, e);
                return;
            }
        };
        let MediaFrame {
            kind,
            conference_id,
            payload,
            ..
        } = frame;
        let conference_id = conference_id.unwrap_or_default();
        let event = match kind {
            MediaKind::Audio => PeerEvent::AudioData { from, payload },
            MediaKind::Video => PeerEvent::VideoData { from, payload },
            MediaKind::ConferenceAudio => PeerEvent::ConferenceAudio {
                from,
                conference_id,
                payload,
            },
            MediaKind::ConferenceVideo => PeerEvent::ConferenceVideo {
                from,
                conference_id,
                payload,
            },
        };
        self.emit(event);
    }
}
