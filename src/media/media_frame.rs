use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};

use crate::media::{frame_error::FrameError, media_kind::MediaKind};

pub const TAG_LEN: usize = 3;
/// `tag(3) | reserved(1) | seq u32 LE(4)`
pub const POINT_HEADER_LEN: usize = 8;
pub const CONFERENCE_ID_LEN: usize = 36;
/// Point header followed by the NUL-padded conference id.
pub const CONFERENCE_HEADER_LEN: usize = POINT_HEADER_LEN + CONFERENCE_ID_LEN;

/// One binary media envelope as carried in a WebSocket binary message.
///
/// The sequence number is written monotonically by the sender but is not
/// used by receivers for reordering or loss detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    pub kind: MediaKind,
    pub seq: u32,
    /// Present for `CAU`/`CVD` only.
    pub conference_id: Option<String>,
    pub payload: Bytes,
}

impl MediaFrame {
    pub fn audio(seq: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MediaKind::Audio,
            seq,
            conference_id: None,
            payload: payload.into(),
        }
    }

    pub fn video(seq: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MediaKind::Video,
            seq,
            conference_id: None,
            payload: payload.into(),
        }
    }

    /// `video == false` builds a `CAU` frame, otherwise `CVD`.
    pub fn conference(
        conference_id: &str,
        video: bool,
        seq: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            kind: if video {
                MediaKind::ConferenceVideo
            } else {
                MediaKind::ConferenceAudio
            },
            seq,
            conference_id: Some(conference_id.to_owned()),
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn header_len(&self) -> usize {
        if self.kind.is_conference() {
            CONFERENCE_HEADER_LEN
        } else {
            POINT_HEADER_LEN
        }
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.header_len() + self.payload.len());

        let mut prefix = [0u8; POINT_HEADER_LEN];
        prefix[..TAG_LEN].copy_from_slice(self.kind.tag());
        LittleEndian::write_u32(&mut prefix[4..8], self.seq);
        buf.put_slice(&prefix);

        if self.kind.is_conference() {
            buf.put_slice(&conference_id_field(
                self.conference_id.as_deref().unwrap_or_default(),
            ));
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a received binary message. The payload shares `data`'s storage.
    ///
    /// # Errors
    /// [`FrameError::TooShort`] before the tag is read if fewer than 8 bytes
    /// are present, and again for conference tags with fewer than 44 bytes.
    /// [`FrameError::UnknownTag`] for anything but `AUD`/`VID`/`CAU`/`CVD`.
    pub fn parse(data: &Bytes) -> Result<Self, FrameError> {
        if data.len() < POINT_HEADER_LEN {
            return Err(FrameError::TooShort {
                len: data.len(),
                needed: POINT_HEADER_LEN,
            });
        }

        let tag = &data[..TAG_LEN];
        let kind = MediaKind::from_tag(tag).ok_or(FrameError::UnknownTag([tag[0], tag[1], tag[2]]))?;
        let seq = LittleEndian::read_u32(&data[4..8]);

        if !kind.is_conference() {
            return Ok(Self {
                kind,
                seq,
                conference_id: None,
                payload: data.slice(POINT_HEADER_LEN..),
            });
        }

        if data.len() < CONFERENCE_HEADER_LEN {
            return Err(FrameError::TooShort {
                len: data.len(),
                needed: CONFERENCE_HEADER_LEN,
            });
        }
        let field = &data[POINT_HEADER_LEN..CONFERENCE_HEADER_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(CONFERENCE_ID_LEN);
        let conference_id = String::from_utf8_lossy(&field[..end]).into_owned();

        Ok(Self {
            kind,
            seq,
            conference_id: Some(conference_id),
            payload: data.slice(CONFERENCE_HEADER_LEN..),
        })
    }
}

/// Conference id as a fixed 36-byte field: truncated on a char boundary,
/// then NUL-padded.
fn conference_id_field(id: &str) -> [u8; CONFERENCE_ID_LEN] {
    let mut field = [0u8; CONFERENCE_ID_LEN];
    let mut cut = id.len().min(CONFERENCE_ID_LEN);
    while !id.is_char_boundary(cut) {
        cut -= 1;
    }
    field[..cut].copy_from_slice(&id.as_bytes()[..cut]);
    field
}
