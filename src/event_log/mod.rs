pub mod consumer;
pub mod memory;
pub mod producer;
