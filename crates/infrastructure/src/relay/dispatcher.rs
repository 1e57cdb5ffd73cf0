//! Message Dispatcher
//!
//! Composes the topic router and the broker publisher into "take one
//! pending row, publish it": resolve the destination topic, build the
//! wire envelope, serialize, publish keyed by the aggregate id.

use arkiva_relay_domain::broker::{BrokerPublisher, PublishError};
use arkiva_relay_domain::envelope::EventEnvelope;
use arkiva_relay_domain::outbox::OutboxEntry;
use arkiva_relay_domain::routing::{RoutingError, TopicRouter};
use std::sync::Arc;
use tracing::debug;

/// Error type for dispatch operations
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

impl DispatchError {
    /// A permanent error is a configuration failure: retrying cannot fix
    /// it, so it must not consume retry budget.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Routing(_))
    }
}

/// Dispatches a single outbox row to the broker.
pub struct MessageDispatcher {
    router: TopicRouter,
    publisher: Arc<dyn BrokerPublisher>,
}

impl MessageDispatcher {
    /// Create a new dispatcher over a router and a publisher.
    pub fn new(router: TopicRouter, publisher: Arc<dyn BrokerPublisher>) -> Self {
        Self { router, publisher }
    }

    /// Publish one outbox row.
    ///
    /// Unmapped aggregates fail immediately with a permanent error;
    /// publisher errors propagate unchanged.
    pub async fn dispatch(&self, entry: &OutboxEntry) -> Result<(), DispatchError> {
        let topic = self.router.resolve(&entry.aggregate)?;

        let envelope = EventEnvelope::from_entry(entry);
        let payload = serde_json::to_vec(&envelope)?;

        let key = entry.aggregate_id.to_string();
        self.publisher
            .publish(topic, &key, &envelope.event_id.to_string(), payload)
            .await?;

        debug!(
            entry_id = entry.id,
            event_id = %envelope.event_id,
            topic = %topic,
            "Dispatched outbox entry"
        );

        Ok(())
    }
}
