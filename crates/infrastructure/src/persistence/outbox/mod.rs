//! PostgreSQL outbox persistence.

pub mod postgres;
pub mod postgres_dlq;

pub use postgres::PostgresOutboxStore;
pub use postgres_dlq::PostgresDeadLetterStore;
