pub mod listener;
pub mod net_action;
pub mod transport_event;
pub mod ws_connection;

pub use net_action::{CloseReason, NetAction};
pub use transport_event::TransportEvent;
pub use ws_connection::{WsCommand, WsWorker};
