use std::fmt;

/// Why an inbound envelope was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    TooLarge { len: usize, max: usize },
    Malformed(String),
    NotAnObject,
    UnknownType(String),
    InvalidBase64(String),
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProtoError::*;
        match self {
            TooLarge { len, max } => write!(f, "envelope of {len} bytes exceeds {max}"),
            Malformed(e) => write!(f, "malformed envelope: {e}"),
            NotAnObject => write!(f, "envelope is not a JSON object"),
            UnknownType(t) => write!(f, "unknown envelope type {t:?}"),
            InvalidBase64(e) => write!(f, "invalid base64 payload: {e}"),
        }
    }
}

impl std::error::Error for ProtoError {}
