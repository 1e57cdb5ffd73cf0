//! Messaging adapters (NATS JetStream via async-nats).

pub mod nats;

pub use nats::{NatsConfig, NatsPublisher};
