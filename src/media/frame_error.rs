use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the header of the frame family requires.
    TooShort { len: usize, needed: usize },
    UnknownTag([u8; 3]),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len, needed } => {
                write!(f, "media frame too short: {len} bytes, need {needed}")
            }
            Self::UnknownTag(tag) => {
                write!(f, "unknown media tag {:?}", String::from_utf8_lossy(tag))
            }
        }
    }
}

impl std::error::Error for FrameError {}
