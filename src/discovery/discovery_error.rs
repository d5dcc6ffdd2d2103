use std::{fmt, io};

#[derive(Debug)]
pub enum DiscoveryError {
    Socket(io::Error),
    Bind { port: u16, source: io::Error },
    /// Datagram that is not a discovery announcement.
    Malformed(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(e) => write!(f, "discovery socket error: {e}"),
            Self::Bind { port, source } => {
                write!(f, "cannot bind discovery port {port}: {source}")
            }
            Self::Malformed(reason) => write!(f, "malformed discovery datagram: {reason}"),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Socket(e) | Self::Bind { source: e, .. } => Some(e),
            Self::Malformed(_) => None,
        }
    }
}

impl From<io::Error> for DiscoveryError {
    fn from(e: io::Error) -> Self {
        Self::Socket(e)
    }
}
