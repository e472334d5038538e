pub mod event_producer;
pub mod event_subscriber;
