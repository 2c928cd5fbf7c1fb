//! Domain layer: the event record shared by producer and consumer.

pub mod event_record;

pub use event_record::{CONTENT_TYPE_JSON, EventRecord};
