//! Domain layer for the Arkiva outbox relay.
//!
//! Defines the outbox data model, the ports the relay is built against
//! (durable store, broker publisher), topic routing, and the wire envelope
//! published to the broker. Infrastructure adapters live in
//! `arkiva-relay-infrastructure`.

pub mod broker;
pub mod envelope;
pub mod outbox;
pub mod routing;

pub use broker::{BrokerPublisher, PublishError};
pub use envelope::EventEnvelope;
pub use outbox::{
    ClaimedEntry, DeadLetterEntry, NewOutboxEntry, OutboxEntry, OutboxError, OutboxStats,
    OutboxStore,
};
pub use routing::{RoutingError, TopicRouter};
