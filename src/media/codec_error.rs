use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The backend could not be constructed with the requested parameters.
    Create(String),
    /// PCM input was not exactly one frame.
    FrameSize { got: usize, expected: usize },
    Encode(String),
    Decode(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CodecError::*;
        match self {
            Create(e) => write!(f, "codec create error: {e}"),
            FrameSize { got, expected } => {
                write!(f, "pcm frame is {got} bytes, expected {expected}")
            }
            Encode(e) => write!(f, "encode error: {e}"),
            Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for CodecError {}

