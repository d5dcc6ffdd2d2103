pub mod envelope;
pub mod envelope_codec;
pub mod peer_event;
pub mod proto_error;
pub mod rate_window;

pub use envelope::{Envelope, SharedContact};
pub use envelope_codec::{MAX_ENVELOPE_BYTES, decode_envelope};
pub use peer_event::{ContactEntry, PeerEvent};
pub use proto_error::ProtoError;
pub use rate_window::{RateLimiter, RateWindow};
