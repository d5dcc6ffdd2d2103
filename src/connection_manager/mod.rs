pub mod conn_state;
pub mod connection_record;
pub mod connection_table;
pub mod pending_queue;

pub use conn_state::{ConnId, ConnState, Direction};
pub use connection_record::ConnectionRecord;
pub use connection_table::ConnectionTable;
pub use pending_queue::PendingQueues;
