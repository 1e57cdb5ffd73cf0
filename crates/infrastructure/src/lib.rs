//! Infrastructure layer for the Arkiva outbox relay.
//!
//! PostgreSQL implementations of the outbox store ports, the NATS
//! JetStream broker publisher, and the relay engine (dispatcher,
//! processor, worker) that drives rows from the outbox table to the
//! broker.

pub mod messaging;
pub mod persistence;
pub mod relay;
