//! Outgoing envelopes, media frames and conference fan-out.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};

use super::PeerEngine;
use crate::connection_manager::ConnState;
use crate::core::send_error::SendError;
use crate::media::{MediaFrame, MediaKind};
use crate::signaling::envelope::{Envelope, SharedContact};
use crate::signaling::envelope_codec::encode_file_data;
use crate::transport::net_action::NetAction;
use crate::{sink_debug, sink_trace};

type SendResult = Result<Vec<NetAction>, SendError>;

/// ISO-8601 UTC time for message envelopes.
fn iso_timestamp(now_ms: u64) -> String {
    i64::try_from(now_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

impl PeerEngine {
    /// Deliver `envelope` to `to` over the cached outbound connection.
    ///
    /// Open connection: sent now. Connecting: queued. No connection: a new
    /// one is requested and the envelope queued until it opens.
    ///
    /// # Errors
    /// [`SendError::PeerUnreachable`] (also reported as an event) when `to`
    /// is not discovered.
    pub fn send_envelope(&mut self, to: &str, envelope: &Envelope, now_ms: u64) -> SendResult {
        self.require_running()?;
        let Some(peer) = self.peers.get(to) else {
            return Err(self.unreachable(to));
        };
        let (addr, url) = (peer.endpoint(), peer.ws_url());
        let text = envelope.to_json()?;

        match self.conns.outbound_for(to).map(|rec| (rec.id, rec.state)) {
            Some((conn, ConnState::Open | ConnState::Identified)) => {
                sink_trace!(self.log, "[Peer] {} -> {} on conn {}", envelope.kind(), to, conn);
                Ok(vec![NetAction::SendText { conn, text }])
            }
            Some((_, ConnState::Connecting)) => {
                self.pending.push(to, text);
                Ok(Vec::new())
            }
            Some((_, ConnState::Closed)) | None => {
                self.conns.evict_outbound(to);
                let conn = self.conns.open_outbound(to, addr, now_ms);
                sink_debug!(self.log, "[Peer] connecting to {} at {} (conn {})", to, url, conn);
                self.pending.push(to, text);
                Ok(vec![NetAction::Connect {
                    conn,
                    peer: to.to_owned(),
                    addr,
                    url,
                }])
            }
        }
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_message(&mut self, to: &str, text: &str, now_ms: u64) -> SendResult {
        let env = Envelope::Message {
            from: self.me.username.clone(),
            text: text.to_owned(),
            timestamp: iso_timestamp(now_ms),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_typing(&mut self, to: &str, now_ms: u64) -> SendResult {
        let env = Envelope::Typing {
            from: self.me.username.clone(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_file_offer(&mut self, to: &str, file_name: &str, file_size: u64, now_ms: u64) -> SendResult {
        let env = Envelope::FileOffer {
            from: self.me.username.clone(),
            file_name: file_name.to_owned(),
            file_size,
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// Whole file inline as base64.
    ///
    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_file_data(&mut self, to: &str, file_name: &str, data: &[u8], now_ms: u64) -> SendResult {
        let env = Envelope::FileData {
            from: self.me.username.clone(),
            file_name: file_name.to_owned(),
            file_size: data.len() as u64,
            data: encode_file_data(data),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_call_offer(&mut self, to: &str, call_id: &str, now_ms: u64) -> SendResult {
        let env = Envelope::CallOffer {
            from: self.me.username.clone(),
            call_id: call_id.to_owned(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_call_accept(&mut self, to: &str, call_id: &str, now_ms: u64) -> SendResult {
        let env = Envelope::CallAccept {
            from: self.me.username.clone(),
            call_id: call_id.to_owned(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_call_reject(&mut self, to: &str, call_id: &str, now_ms: u64) -> SendResult {
        let env = Envelope::CallReject {
            from: self.me.username.clone(),
            call_id: call_id.to_owned(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_call_end(&mut self, to: &str, call_id: &str, now_ms: u64) -> SendResult {
        let env = Envelope::CallEnd {
            from: self.me.username.clone(),
            call_id: call_id.to_owned(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_group_create(
        &mut self,
        to: &str,
        group_id: &str,
        group_name: &str,
        members: Vec<String>,
        now_ms: u64,
    ) -> SendResult {
        let env = Envelope::GroupCreate {
            from: self.me.username.clone(),
            group_id: group_id.to_owned(),
            group_name: group_name.to_owned(),
            members,
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_group_message(&mut self, to: &str, group_id: &str, text: &str, now_ms: u64) -> SendResult {
        let env = Envelope::GroupMessage {
            from: self.me.username.clone(),
            group_id: group_id.to_owned(),
            text: text.to_owned(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_group_typing(&mut self, to: &str, group_id: &str, now_ms: u64) -> SendResult {
        let env = Envelope::GroupTyping {
            from: self.me.username.clone(),
            group_id: group_id.to_owned(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_group_invite(
        &mut self,
        to: &str,
        group_id: &str,
        group_name: &str,
        members: Vec<String>,
        now_ms: u64,
    ) -> SendResult {
        let env = Envelope::GroupInvite {
            from: self.me.username.clone(),
            group_id: group_id.to_owned(),
            group_name: group_name.to_owned(),
            members,
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_group_leave(&mut self, to: &str, group_id: &str, now_ms: u64) -> SendResult {
        let env = Envelope::GroupLeave {
            from: self.me.username.clone(),
            group_id: group_id.to_owned(),
        };
        self.send_envelope(to, &env, now_ms)
    }

    /// # Errors
    /// See [`Self::send_envelope`].
    pub fn send_contact_share(&mut self, to: &str, contact: SharedContact, now_ms: u64) -> SendResult {
        let env = Envelope::ContactShare {
            from: self.me.username.clone(),
            shared_contact: contact,
        };
        self.send_envelope(to, &env, now_ms)
    }

    // ---------------------------------------------------------------
    // Point-to-point media
    // ---------------------------------------------------------------

    /// # Errors
    /// See [`Self::send_media`].
    pub fn send_audio(&mut self, to: &str, payload: Bytes, now_ms: u64) -> SendResult {
        self.send_media(to, MediaKind::Audio, payload, now_ms)
    }

    /// # Errors
    /// See [`Self::send_media`].
    pub fn send_video(&mut self, to: &str, payload: Bytes, now_ms: u64) -> SendResult {
        self.send_media(to, MediaKind::Video, payload, now_ms)
    }

    /// Media is never queued. Without an open connection the frame is
    /// dropped; if none exists one is requested for the frames that follow.
    ///
    /// # Errors
    /// [`SendError::PeerUnreachable`] when `to` is not discovered.
    pub fn send_media(&mut self, to: &str, kind: MediaKind, payload: Bytes, now_ms: u64) -> SendResult {
        self.require_running()?;
        if !self.peers.contains(to) {
            return Err(self.unreachable(to));
        }
        match self.conns.outbound_for(to).map(|rec| (rec.id, rec.state)) {
            Some((conn, ConnState::Open | ConnState::Identified)) => {
                let seq = self.peer_seq.next_seq((to.to_owned(), kind));
                let frame = match kind {
                    MediaKind::Video => MediaFrame::video(seq, payload),
                    _ => MediaFrame::audio(seq, payload),
                };
                Ok(vec![NetAction::SendBinary {
                    conn,
                    data: frame.encode(),
                }])
            }
            Some((_, ConnState::Connecting)) => Ok(Vec::new()),
            Some((_, ConnState::Closed)) | None => Ok(self.warm_up(to, now_ms).into_iter().collect()),
        }
    }

    /// Request a connection without queueing anything on it.
    fn warm_up(&mut self, to: &str, now_ms: u64) -> Option<NetAction> {
        let peer = self.peers.get(to)?;
        let (addr, url) = (peer.endpoint(), peer.ws_url());
        self.conns.evict_outbound(to);
        let conn = self.conns.open_outbound(to, addr, now_ms);
        sink_debug!(self.log, "[Peer] opening media path to {} (conn {})", to, conn);
        Some(NetAction::Connect {
            conn,
            peer: to.to_owned(),
            addr,
            url,
        })
    }

    // ---------------------------------------------------------------
    // Conferences
    // ---------------------------------------------------------------

    /// Create a conference hosted by this peer and announce it to every
    /// other participant. Returns the new id.
    ///
    /// # Errors
    /// [`SendError::NotRunning`].
    pub fn create_conference(
        &mut self,
        participants: Vec<String>,
        now_ms: u64,
    ) -> Result<(String, Vec<NetAction>), SendError> {
        self.require_running()?;
        let me = self.me.username.clone();
        let rec = self.conferences.create(&me, participants, now_ms);
        let conference_id = rec.conference_id.clone();
        let members: Vec<String> = rec.participants.iter().cloned().collect();
        let others: Vec<String> = rec.others(&me).map(str::to_owned).collect();

        sink_debug!(
            self.log,
            "[Conference] created {} with {} participants",
            conference_id,
            members.len()
        );
        let env = Envelope::ConfCreate {
            from: me,
            conference_id: conference_id.clone(),
            participants: members,
        };
        let actions = self.fan_out(&others, &env, now_ms);
        Ok((conference_id, actions))
    }

    /// # Errors
    /// [`SendError::Conference`] for an unknown id.
    pub fn join_conference(&mut self, conference_id: &str, now_ms: u64) -> SendResult {
        self.require_running()?;
        let me = self.me.username.clone();
        self.conferences.join(conference_id, &me)?;
        let others = self.conference_others(conference_id)?;
        let env = Envelope::ConfJoin {
            from: me,
            conference_id: conference_id.to_owned(),
        };
        Ok(self.fan_out(&others, &env, now_ms))
    }

    /// Tell the others, then leave. The conference ends when empty.
    ///
    /// # Errors
    /// [`SendError::Conference`] for an unknown id or when not a participant.
    pub fn leave_conference(&mut self, conference_id: &str, now_ms: u64) -> SendResult {
        self.require_running()?;
        let me = self.me.username.clone();
        let others = self.conference_others(conference_id)?;
        if self.conferences.leave(conference_id, &me)? {
            sink_debug!(self.log, "[Conference] {} ended", conference_id);
        }
        self.conf_seq.forget_where(|(c, _)| c == conference_id);
        let env = Envelope::ConfLeave {
            from: me,
            conference_id: conference_id.to_owned(),
        };
        Ok(self.fan_out(&others, &env, now_ms))
    }

    /// # Errors
    /// See [`Self::send_conference_media`].
    pub fn send_conference_audio(&mut self, conference_id: &str, payload: Bytes, now_ms: u64) -> SendResult {
        self.send_conference_media(conference_id, false, payload, now_ms)
    }

    /// # Errors
    /// See [`Self::send_conference_media`].
    pub fn send_conference_video(&mut self, conference_id: &str, payload: Bytes, now_ms: u64) -> SendResult {
        self.send_conference_media(conference_id, true, payload, now_ms)
    }

    /// One frame, one shared sequence number, sent to every other
    /// participant that is discovered and has an open connection.
    ///
    /// # Errors
    /// [`SendError::Conference`] for an unknown id.
    pub fn send_conference_media(
        &mut self,
        conference_id: &str,
        video: bool,
        payload: Bytes,
        now_ms: u64,
    ) -> SendResult {
        self.require_running()?;
        let others = self.conference_others(conference_id)?;
        let frame_kind = if video {
            MediaKind::ConferenceVideo
        } else {
            MediaKind::ConferenceAudio
        };
        let seq = self.conf_seq.next_seq((conference_id.to_owned(), frame_kind));
        let data = MediaFrame::conference(conference_id, video, seq, payload).encode();

        let reachable: Vec<String> = others
            .into_iter()
            .filter(|p| self.peers.contains(p))
            .collect();
        let mut actions = Vec::new();
        for peer in &reachable {
            match self.conns.outbound_for(peer).map(|rec| (rec.id, rec.state)) {
                Some((conn, ConnState::Open | ConnState::Identified)) => {
                    actions.push(NetAction::SendBinary {
                        conn,
                        data: data.clone(),
                    });
                }
                Some((_, ConnState::Connecting)) => {}
                Some((_, ConnState::Closed)) | None => actions.extend(self.warm_up(peer, now_ms)),
            }
        }
        Ok(actions)
    }

    fn conference_others(&self, conference_id: &str) -> Result<Vec<String>, SendError> {
        let me = &self.me.username;
        Ok(self
            .conferences
            .participants(conference_id)?
            .into_iter()
            .filter(|p| p != me)
            .collect())
    }

    /// Send one envelope to each peer; unreachable ones are skipped.
    fn fan_out(&mut self, peers: &[String], env: &Envelope, now_ms: u64) -> Vec<NetAction> {
        let mut actions = Vec::new();
        for peer in peers {
            match self.send_envelope(peer, env, now_ms) {
                Ok(a) => actions.extend(a),
                Err(e) => sink_debug!(self.log, "[Conference] skipping {}: {}", peer, e),
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_utc_iso() {
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_timestamp(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }
}
