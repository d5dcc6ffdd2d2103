use std::{fmt, io};

use crate::discovery::DiscoveryError;

#[derive(Debug)]
pub enum ServiceError {
    AlreadyRunning,
    InvalidUsername,
    DiscoveryBind(DiscoveryError),
    ListenerBind(io::Error),
    /// A worker thread could not be spawned.
    Spawn(io::Error),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "peer service already running"),
            Self::InvalidUsername => write!(f, "username must not be empty"),
            Self::DiscoveryBind(e) => write!(f, "{e}"),
            Self::ListenerBind(e) => write!(f, "cannot bind connection listener: {e}"),
            Self::Spawn(e) => write!(f, "cannot spawn worker thread: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DiscoveryBind(e) => Some(e),
            Self::ListenerBind(e) | Self::Spawn(e) => Some(e),
            Self::AlreadyRunning | Self::InvalidUsername => None,
        }
    }
}

impl From<DiscoveryError> for ServiceError {
    fn from(e: DiscoveryError) -> Self {
        Self::DiscoveryBind(e)
    }
}
