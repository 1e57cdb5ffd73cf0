//! Dead Letter Model
//!
//! A permanently-failed outbox entry, kept for manual inspection and
//! replay instead of being retried forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OutboxEntry;

/// A 1:1 shadow of a permanently-failed outbox row, keyed by the same id.
///
/// Upserted so repeated failure handling never duplicates rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Id of the outbox row this entry shadows.
    pub id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// String representation of the last delivery error.
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// Build a dead-letter entry from a failed outbox row and its last error.
    pub fn from_entry(entry: &OutboxEntry, error: impl Into<String>) -> Self {
        Self {
            id: entry.id,
            event_type: entry.event_type.clone(),
            payload: entry.payload.clone(),
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}
