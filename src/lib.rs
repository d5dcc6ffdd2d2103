//! LanPeer is a serverless peer-to-peer communication layer for local networks.
//!
//! Peers find each other with multicast/broadcast presence datagrams, open
//! WebSocket connections on demand, and exchange JSON signaling envelopes
//! (chat, typing, files, calls, groups, conferences) plus tagged binary media
//! frames. The `lanpeer` binary is a small console front-end over
//! [`core::LanPeerService`].

/// Conference membership registry.
pub mod conference;
/// Handles configuration loading and management.
pub mod config;
/// Connection ids, lifecycle states, outbound cache and pending queues.
pub mod connection_manager;
/// Peer state machine, event loop and service facade.
pub mod core;
/// Presence datagrams, peer table and the discovery socket.
pub mod discovery;
/// Logging utilities for the application.
pub mod log;
/// Media framing, speech codecs, jitter buffer and audio streams.
pub mod media;
/// JSON envelopes, their codec, rate limiting and application events.
pub mod signaling;
/// WebSocket connection workers and the inbound listener.
pub mod transport;

pub use crate::core::{LanPeerService, PeerEngine, SendError, ServiceError};
pub use config::{Config, ServiceConfig};
pub use signaling::{ContactEntry, PeerEvent};
