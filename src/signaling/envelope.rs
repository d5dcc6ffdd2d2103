//! One JSON envelope per logical event exchanged over a peer connection.
//!
//! Wire shape: `{"type":"<snake_case>", "from":..., <camelCase fields>}`.
//! `identify` is the only type without `from`. Missing fields read as
//! empty, so identity checks (not deserialization) reject a missing `from`.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedContact {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub skype_name: String,
    #[serde(default)]
    pub skype_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Identify {
        #[serde(default)]
        username: String,
    },
    Message {
        #[serde(default)]
        from: String,
        #[serde(default)]
        text: String,
        /// ISO-8601 send time.
        #[serde(default)]
        timestamp: String,
    },
    MessageAck {
        #[serde(default)]
        from: String,
        #[serde(default)]
        text: String,
    },
    Typing {
        #[serde(default)]
        from: String,
    },
    #[serde(rename_all = "camelCase")]
    FileOffer {
        #[serde(default)]
        from: String,
        #[serde(default)]
        file_name: String,
        #[serde(default, deserialize_with = "size_from_number")]
        file_size: u64,
    },
    #[serde(rename_all = "camelCase")]
    FileData {
        #[serde(default)]
        from: String,
        #[serde(default)]
        file_name: String,
        #[serde(default, deserialize_with = "size_from_number")]
        file_size: u64,
        /// Standard base64 of the file bytes.
        #[serde(default)]
        data: String,
    },
    #[serde(rename_all = "camelCase")]
    CallOffer {
        #[serde(default)]
        from: String,
        #[serde(default)]
        call_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CallAccept {
        #[serde(default)]
        from: String,
        #[serde(default)]
        call_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CallReject {
        #[serde(default)]
        from: String,
        #[serde(default)]
        call_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CallEnd {
        #[serde(default)]
        from: String,
        #[serde(default)]
        call_id: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupCreate {
        #[serde(default)]
        from: String,
        #[serde(default)]
        group_id: String,
        #[serde(default)]
        group_name: String,
        #[serde(default)]
        members: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    GroupMessage {
        #[serde(default)]
        from: String,
        #[serde(default)]
        group_id: String,
        #[serde(default)]
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupTyping {
        #[serde(default)]
        from: String,
        #[serde(default)]
        group_id: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupInvite {
        #[serde(default)]
        from: String,
        #[serde(default)]
        group_id: String,
        #[serde(default)]
        group_name: String,
        #[serde(default)]
        members: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    GroupLeave {
        #[serde(default)]
        from: String,
        #[serde(default)]
        group_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ContactShare {
        #[serde(default)]
        from: String,
        #[serde(default)]
        shared_contact: SharedContact,
    },
    #[serde(rename_all = "camelCase")]
    ConfCreate {
        #[serde(default)]
        from: String,
        #[serde(default)]
        conference_id: String,
        #[serde(default)]
        participants: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    ConfJoin {
        #[serde(default)]
        from: String,
        #[serde(default)]
        conference_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ConfLeave {
        #[serde(default)]
        from: String,
        #[serde(default)]
        conference_id: String,
    },
}

/// Every `type` value this peer understands.
pub const KNOWN_TYPES: [&str; 19] = [
    "identify",
    "message",
    "message_ack",
    "typing",
    "file_offer",
    "file_data",
    "call_offer",
    "call_accept",
    "call_reject",
    "call_end",
    "group_create",
    "group_message",
    "group_typing",
    "group_invite",
    "group_leave",
    "contact_share",
    "conf_create",
    "conf_join",
    "conf_leave",
];

impl Envelope {
    /// Wire `type` value.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        use Envelope::*;
        match self {
            Identify { .. } => "identify",
            Message { .. } => "message",
            MessageAck { .. } => "message_ack",
            Typing { .. } => "typing",
            FileOffer { .. } => "file_offer",
            FileData { .. } => "file_data",
            CallOffer { .. } => "call_offer",
            CallAccept { .. } => "call_accept",
            CallReject { .. } => "call_reject",
            CallEnd { .. } => "call_end",
            GroupCreate { .. } => "group_create",
            GroupMessage { .. } => "group_message",
            GroupTyping { .. } => "group_typing",
            GroupInvite { .. } => "group_invite",
            GroupLeave { .. } => "group_leave",
            ContactShare { .. } => "contact_share",
            ConfCreate { .. } => "conf_create",
            ConfJoin { .. } => "conf_join",
            ConfLeave { .. } => "conf_leave",
        }
    }

    /// Claimed sender; `None` for `identify`.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        use Envelope::*;
        match self {
            Identify { .. } => None,
            Message { from, .. }
            | MessageAck { from, .. }
            | Typing { from }
            | FileOffer { from, .. }
            | FileData { from, .. }
            | CallOffer { from, .. }
            | CallAccept { from, .. }
            | CallReject { from, .. }
            | CallEnd { from, .. }
            | GroupCreate { from, .. }
            | GroupMessage { from, .. }
            | GroupTyping { from, .. }
            | GroupInvite { from, .. }
            | GroupLeave { from, .. }
            | ContactShare { from, .. }
            | ConfCreate { from, .. }
            | ConfJoin { from, .. }
            | ConfLeave { from, .. } => Some(from.as_str()),
        }
    }

    #[must_use]
    pub fn is_identify(&self) -> bool {
        matches!(self, Self::Identify { .. })
    }

    /// Compact JSON text.
    ///
    /// # Errors
    /// Propagates serializer failure.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// File sizes arrive as JSON doubles from some senders.
fn size_from_number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let v = f64::deserialize(d)?;
    Ok(if v.is_finite() && v > 0.0 { v as u64 } else { 0 })
}
