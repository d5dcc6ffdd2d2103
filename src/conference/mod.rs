pub mod conference_error;
pub mod conference_record;
pub mod conference_registry;

pub use conference_error::ConferenceError;
pub use conference_record::ConferenceRecord;
pub use conference_registry::ConferenceRegistry;
