use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConferenceError {
    NotFound(String),
    NotParticipant { conference_id: String, user: String },
}

impl fmt::Display for ConferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "conference {id} not found"),
            Self::NotParticipant {
                conference_id,
                user,
            } => write!(f, "{user} is not in conference {conference_id}"),
        }
    }
}

impl std::error::Error for ConferenceError {}

pub type Result<T> = std::result::Result<T, ConferenceError>;
