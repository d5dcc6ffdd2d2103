/// Stream family carried by a binary frame, identified by its 3-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// `AUD`: point-to-point speech packet.
    Audio,
    /// `VID`: point-to-point JPEG frame.
    Video,
    /// `CAU`: conference speech packet.
    ConferenceAudio,
    /// `CVD`: conference JPEG frame.
    ConferenceVideo,
}

impl MediaKind {
    #[must_use]
    pub const fn tag(self) -> &'static [u8; 3] {
        match self {
            Self::Audio => b"AUD",
            Self::Video => b"VID",
            Self::ConferenceAudio => b"CAU",
            Self::ConferenceVideo => b"CVD",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"AUD" => Some(Self::Audio),
            b"VID" => Some(Self::Video),
            b"CAU" => Some(Self::ConferenceAudio),
            b"CVD" => Some(Self::ConferenceVideo),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_conference(self) -> bool {
        matches!(self, Self::ConferenceAudio | Self::ConferenceVideo)
    }

    #[must_use]
    pub const fn is_audio(self) -> bool {
        matches!(self, Self::Audio | Self::ConferenceAudio)
    }
}
