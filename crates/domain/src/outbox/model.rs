//! Outbox Entry Model
//!
//! Domain model for outbox rows used in the Transactional Outbox Pattern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error types for outbox operations
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entry not found: {0}")]
    NotFound(i64),

    #[error("Infrastructure error: {message}")]
    InfrastructureError { message: String },
}

/// An outbox row ready to be inserted by the producing business transaction.
///
/// The producing application must insert these inside the same transaction
/// that commits the triggering business change; otherwise the delivery
/// guarantee degrades to best-effort.
#[derive(Debug, Clone)]
pub struct NewOutboxEntry {
    pub aggregate: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl NewOutboxEntry {
    pub fn new(
        aggregate: impl Into<String>,
        aggregate_id: Uuid,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            aggregate: aggregate.into(),
            aggregate_id,
            event_type: event_type.into(),
            payload,
            occurred_at,
        }
    }
}

/// A durable outbox row as read back from the store.
///
/// `id` is the global ordering key. A row with `processed_at = None` is
/// pending; once set, the row is terminal and excluded from all future
/// claims. The relay never deletes rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub aggregate: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Check if the entry is still awaiting delivery.
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }

    /// Get the age of the entry.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.occurred_at)
    }
}

/// Statistics about the outbox table, used for periodic worker logging.
#[derive(Debug, Clone, Default)]
pub struct OutboxStats {
    pub pending_count: u64,
    pub processed_count: u64,
    pub oldest_pending_age_seconds: Option<i64>,
}

impl OutboxStats {
    pub fn total(&self) -> u64 {
        self.pending_count + self.processed_count
    }
}
