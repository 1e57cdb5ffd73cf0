//! Broker Publisher Port
//!
//! Narrow capability over a message-broker client: publish one message and
//! return only once the broker has durably acknowledged it.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to connect to broker: {0}")]
    Connection(String),
    #[error("Failed to publish message: {0}")]
    Publish(String),
    #[error("Broker did not acknowledge message: {0}")]
    Acknowledgment(String),
}

/// Publishes messages to the downstream broker.
///
/// A successful return is a durability guarantee, not a send-attempted
/// signal: implementations must wait for the broker's acknowledgment and
/// enable broker-side idempotent-producer semantics keyed by `message_id`.
/// Messages sharing a `key` are delivered in publish order.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        message_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), PublishError>;
}
