//! Wire Envelope
//!
//! The JSON envelope published to the broker for every outbox row. The
//! envelope id is derived deterministically from the row, so republishing
//! the same row after a crash yields a byte-identical `eventId` and
//! consumers can deduplicate on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outbox::OutboxEntry;

/// Namespace for deriving envelope ids (UUIDv5).
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x9f2c_41d6_8a3e_4b7f_b1c5_2d90_77ae_63f4);

/// Envelope published to the broker, serialized as
/// `{ "eventId", "type", "aggregate", "aggregateId", "occurredAtUtc", "data" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub aggregate: String,
    pub aggregate_id: Uuid,
    pub occurred_at_utc: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Build the envelope for an outbox row.
    pub fn from_entry(entry: &OutboxEntry) -> Self {
        Self {
            event_id: derive_event_id(entry.id, entry.aggregate_id, entry.occurred_at),
            event_type: entry.event_type.clone(),
            aggregate: entry.aggregate.clone(),
            aggregate_id: entry.aggregate_id,
            occurred_at_utc: entry.occurred_at,
            data: entry.payload.clone(),
        }
    }
}

/// Derive a stable envelope id from a row's identity.
///
/// UUIDv5 over `(aggregate_id, occurred_at, row id)`. Including the row's
/// primary key means two rows for the same aggregate that share a
/// timestamp at sub-microsecond resolution still get distinct ids, while
/// re-deriving for the same row always produces the same id.
pub fn derive_event_id(entry_id: i64, aggregate_id: Uuid, occurred_at: DateTime<Utc>) -> Uuid {
    let mut input = [0u8; 32];
    input[..16].copy_from_slice(aggregate_id.as_bytes());
    input[16..24].copy_from_slice(&occurred_at.timestamp_micros().to_be_bytes());
    input[24..].copy_from_slice(&entry_id.to_be_bytes());
    Uuid::new_v5(&EVENT_ID_NAMESPACE, &input)
}
