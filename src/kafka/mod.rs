//! Typed producer/consumer bindings over the message broker.

pub mod consumer;
pub mod producer;
pub mod types;

pub use consumer::EventConsumer;
pub use producer::EventProducer;
