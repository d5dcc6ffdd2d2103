use std::net::IpAddr;
use std::sync::mpsc::Sender;

use bytes::Bytes;

use crate::core::send_error::SendError;
use crate::signaling::envelope::SharedContact;

/// Requests from the service facade to the event loop.
///
/// Fire-and-forget except where a `reply` channel is carried.
#[derive(Debug)]
pub enum PeerCommand {
    SetStatus(String),
    Probe(IpAddr),
    RequestContacts,
    AddContact(String),

    Message {
        to: String,
        text: String,
    },
    Typing {
        to: String,
    },
    FileOffer {
        to: String,
        file_name: String,
        file_size: u64,
    },
    FileData {
        to: String,
        file_name: String,
        data: Bytes,
    },
    CallOffer {
        to: String,
        call_id: String,
    },
    CallAccept {
        to: String,
        call_id: String,
    },
    CallReject {
        to: String,
        call_id: String,
    },
    CallEnd {
        to: String,
        call_id: String,
    },
    GroupCreate {
        to: String,
        group_id: String,
        group_name: String,
        members: Vec<String>,
    },
    GroupMessage {
        to: String,
        group_id: String,
        text: String,
    },
    GroupTyping {
        to: String,
        group_id: String,
    },
    GroupInvite {
        to: String,
        group_id: String,
        group_name: String,
        members: Vec<String>,
    },
    GroupLeave {
        to: String,
        group_id: String,
    },
    ContactShare {
        to: String,
        contact: SharedContact,
    },

    Audio {
        to: String,
        payload: Bytes,
    },
    Video {
        to: String,
        payload: Bytes,
    },

    CreateConference {
        participants: Vec<String>,
        reply: Sender<Result<String, SendError>>,
    },
    JoinConference {
        conference_id: String,
    },
    LeaveConference {
        conference_id: String,
    },
    ConferenceAudio {
        conference_id: String,
        payload: Bytes,
    },
    ConferenceVideo {
        conference_id: String,
        payload: Bytes,
    },
}
