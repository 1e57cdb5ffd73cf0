//! Persistence adapters (PostgreSQL via sqlx).

pub mod outbox;

pub use outbox::{PostgresDeadLetterStore, PostgresOutboxStore};
