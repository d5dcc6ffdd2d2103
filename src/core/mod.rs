//! The `core` module owns the peer state machine, the event loop that drives
//! it, and the `LanPeerService` facade applications talk to.
pub mod engine;
pub mod lan_peer_service;
pub mod loop_event;
pub mod peer_command;
pub mod runtime;
pub mod send_error;
pub mod service_error;

pub use engine::{LocalIdentity, PeerEngine};
pub use lan_peer_service::LanPeerService;
pub use peer_command::PeerCommand;
pub use send_error::SendError;
pub use service_error::ServiceError;
