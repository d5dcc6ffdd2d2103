pub mod discovery_error;
pub mod discovery_packet;
pub mod discovery_socket;
pub mod discovery_worker;
pub mod peer_record;
pub mod peer_table;

pub use discovery_error::DiscoveryError;
pub use discovery_packet::DiscoveryPacket;
pub use discovery_socket::DiscoverySocket;
pub use discovery_worker::DiscoveryDatagram;
pub use peer_record::PeerRecord;
pub use peer_table::{PeerTable, Upsert};
