use bytes::Bytes;

use crate::discovery::peer_record::PeerRecord;
use crate::signaling::envelope::SharedContact;

/// Contact list row derived from the peer table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEntry {
    pub username: String,
    pub display_name: String,
    pub status: String,
    pub dialable_number: String,
}

impl From<&PeerRecord> for ContactEntry {
    fn from(rec: &PeerRecord) -> Self {
        Self {
            username: rec.username.clone(),
            display_name: rec.username.clone(),
            status: rec.status.clone(),
            dialable_number: rec.dialable_number.clone(),
        }
    }
}

/// Everything the peer service reports to its host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Service started.
    Connected,
    /// Service stopped.
    Disconnected,
    ContactList(Vec<ContactEntry>),
    ContactAdded {
        peer: String,
    },
    PresenceChanged {
        peer: String,
        status: String,
    },

    MessageReceived {
        from: String,
        text: String,
        timestamp: String,
    },
    MessageAcknowledged {
        from: String,
        text: String,
    },
    Typing {
        from: String,
    },
    FileOffer {
        from: String,
        file_name: String,
        file_size: u64,
    },
    FileData {
        from: String,
        file_name: String,
        data: Bytes,
    },

    CallOffer {
        from: String,
        call_id: String,
    },
    CallAccepted {
        from: String,
        call_id: String,
    },
    CallRejected {
        from: String,
        call_id: String,
    },
    CallEnded {
        from: String,
        call_id: String,
    },

    GroupCreated {
        from: String,
        group_id: String,
        group_name: String,
        members: Vec<String>,
    },
    GroupMessage {
        from: String,
        group_id: String,
        text: String,
    },
    GroupTyping {
        from: String,
        group_id: String,
    },
    GroupInvite {
        from: String,
        group_id: String,
        group_name: String,
        members: Vec<String>,
    },
    GroupLeft {
        from: String,
        group_id: String,
    },
    ContactShared {
        from: String,
        contact: SharedContact,
    },

    ConferenceCreated {
        from: String,
        conference_id: String,
        participants: Vec<String>,
    },
    ConferenceJoined {
        from: String,
        conference_id: String,
    },
    ConferenceLeft {
        from: String,
        conference_id: String,
    },

    AudioData {
        from: String,
        payload: Bytes,
    },
    VideoData {
        from: String,
        payload: Bytes,
    },
    ConferenceAudio {
        from: String,
        conference_id: String,
        payload: Bytes,
    },
    ConferenceVideo {
        from: String,
        conference_id: String,
        payload: Bytes,
    },

    /// An established outbound connection to `peer` closed.
    ConnectionLost {
        peer: String,
    },
    /// A send was refused locally: `peer` is not in the peer table.
    PeerUnreachable {
        peer: String,
    },
}
