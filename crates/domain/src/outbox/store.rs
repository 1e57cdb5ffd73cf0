//! Outbox Store Ports
//!
//! The relay claims work one row at a time: each claim owns a row-scoped
//! transaction in the durable store, holding a lock that other relay
//! instances skip over. The claim ends in exactly one of three ways:
//! marked processed, dead-lettered, or dropped (rolling the transaction
//! back and leaving the row pending).

use async_trait::async_trait;

use super::{OutboxEntry, OutboxError};

/// A claimed pending outbox row plus the transaction that locks it.
///
/// At most one relay instance holds a claim on a given row at any instant;
/// concurrent claimers skip locked rows instead of waiting. Dropping a
/// claim without completing it rolls the transaction back, so the row
/// stays pending and becomes claimable again.
#[async_trait]
pub trait ClaimedEntry: Send {
    /// The claimed row.
    fn entry(&self) -> &OutboxEntry;

    /// Terminal success: set `processed_at` and commit.
    async fn mark_processed(self: Box<Self>) -> Result<(), OutboxError>;

    /// Terminal failure: upsert the dead-letter shadow row carrying the
    /// last error, set `processed_at`, and commit — one atomic
    /// transaction. A dead-lettered row counts as processed and is never
    /// retried automatically.
    async fn dead_letter(self: Box<Self>, error: &str) -> Result<(), OutboxError>;
}

/// Port for claiming pending outbox rows under safe concurrency.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim the oldest pending row not locked by another transaction.
    ///
    /// Returns `None` when no claimable row exists (the queue is drained
    /// or every remaining pending row is locked by a concurrent relay
    /// instance).
    async fn claim_next(&self) -> Result<Option<Box<dyn ClaimedEntry>>, OutboxError>;
}
