//! In-memory doubles for relay engine tests.
//!
//! The store double enforces the claim contract: a row can only be
//! claimed while nobody else holds it, and can only reach a terminal
//! state once. Violations panic, so concurrency tests fail loudly.

use arkiva_relay_domain::broker::{BrokerPublisher, PublishError};
use arkiva_relay_domain::outbox::{ClaimedEntry, OutboxEntry, OutboxError, OutboxStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn entry_for(id: i64, aggregate: &str, aggregate_id: Uuid) -> OutboxEntry {
    OutboxEntry {
        id,
        aggregate: aggregate.to_string(),
        aggregate_id,
        event_type: "DocumentUploaded".to_string(),
        payload: serde_json::json!({"entry": id}),
        occurred_at: Utc::now(),
        processed_at: None,
    }
}

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub message_id: String,
    pub payload: Vec<u8>,
}

/// Publisher double: records successful publishes, optionally failing the
/// first N attempts (or all of them), optionally sleeping per publish to
/// force task interleaving in concurrency tests.
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedMessage>>,
    failures_remaining: Mutex<u64>,
    attempts: Mutex<u64>,
    delay: Option<Duration>,
}

impl RecordingPublisher {
    pub fn reliable() -> Self {
        Self::failing_times(0)
    }

    pub fn failing() -> Self {
        Self::failing_times(u64::MAX)
    }

    pub fn failing_times(failures: u64) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(failures),
            attempts: Mutex::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u64 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl BrokerPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        message_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        *self.attempts.lock().unwrap() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                if *failures != u64::MAX {
                    *failures -= 1;
                }
                return Err(PublishError::Publish("broker unavailable".to_string()));
            }
        }

        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            message_id: message_id.to_string(),
            payload,
        });

        Ok(())
    }
}

#[derive(Default)]
struct MemoryOutboxInner {
    rows: BTreeMap<i64, OutboxEntry>,
    /// Ids currently claimed (lock held) by some processor.
    active: HashSet<i64>,
    dead: HashMap<i64, String>,
}

/// Store double over a plain map, mimicking skip-locked claiming.
#[derive(Clone, Default)]
pub struct MemoryOutboxStore {
    inner: Arc<Mutex<MemoryOutboxInner>>,
}

impl MemoryOutboxStore {
    pub fn with_entries(entries: Vec<OutboxEntry>) -> Self {
        let store = Self::default();
        {
            let mut inner = store.inner.lock().unwrap();
            for entry in entries {
                inner.rows.insert(entry.id, entry);
            }
        }
        store
    }

    pub fn processed_ids(&self) -> Vec<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .rows
            .values()
            .filter(|e| e.processed_at.is_some())
            .map(|e| e.id)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.rows.values().filter(|e| e.is_pending()).count()
    }

    pub fn dead_letters(&self) -> HashMap<i64, String> {
        self.inner.lock().unwrap().dead.clone()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn claim_next(&self) -> Result<Option<Box<dyn ClaimedEntry>>, OutboxError> {
        let mut inner = self.inner.lock().unwrap();

        let next = inner
            .rows
            .values()
            .find(|e| e.is_pending() && !inner.active.contains(&e.id))
            .cloned();

        match next {
            None => Ok(None),
            Some(entry) => {
                assert!(
                    inner.active.insert(entry.id),
                    "row {} claimed twice concurrently",
                    entry.id
                );
                Ok(Some(Box::new(MemoryClaim {
                    entry,
                    store: self.clone(),
                    completed: false,
                })))
            }
        }
    }
}

pub struct MemoryClaim {
    entry: OutboxEntry,
    store: MemoryOutboxStore,
    completed: bool,
}

impl MemoryClaim {
    fn finish(&mut self, error: Option<&str>) {
        let mut inner = self.store.inner.lock().unwrap();

        let row = inner
            .rows
            .get_mut(&self.entry.id)
            .expect("claimed row must exist");
        assert!(
            row.processed_at.is_none(),
            "row {} reached a terminal state twice",
            self.entry.id
        );
        row.processed_at = Some(Utc::now());

        if let Some(error) = error {
            let id = self.entry.id;
            inner.dead.insert(id, error.to_string());
        }

        inner.active.remove(&self.entry.id);
        self.completed = true;
    }
}

#[async_trait]
impl ClaimedEntry for MemoryClaim {
    fn entry(&self) -> &OutboxEntry {
        &self.entry
    }

    async fn mark_processed(self: Box<Self>) -> Result<(), OutboxError> {
        let mut this = *self;
        this.finish(None);
        Ok(())
    }

    async fn dead_letter(self: Box<Self>, error: &str) -> Result<(), OutboxError> {
        let mut this = *self;
        this.finish(Some(error));
        Ok(())
    }
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        // An abandoned claim releases its lock, leaving the row pending.
        if !self.completed {
            let mut inner = self.store.inner.lock().unwrap();
            inner.active.remove(&self.entry.id);
        }
    }
}
