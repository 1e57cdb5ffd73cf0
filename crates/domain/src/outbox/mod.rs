//! Outbox domain model and store ports.

pub mod dead_letter;
pub mod model;
pub mod store;

pub use dead_letter::DeadLetterEntry;
pub use model::{NewOutboxEntry, OutboxEntry, OutboxError, OutboxStats};
pub use store::{ClaimedEntry, OutboxStore};
