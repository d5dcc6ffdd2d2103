use std::fmt;

use crate::conference::ConferenceError;

/// Why a send request was refused locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    NotRunning,
    /// Recipient is not in the peer table.
    PeerUnreachable(String),
    Encode(String),
    Conference(ConferenceError),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => write!(f, "peer service is not running"),
            Self::PeerUnreachable(peer) => write!(f, "peer {peer} is not reachable"),
            Self::Encode(e) => write!(f, "cannot encode envelope: {e}"),
            Self::Conference(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Conference(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<ConferenceError> for SendError {
    fn from(e: ConferenceError) -> Self {
        Self::Conference(e)
    }
}
