//! Relay Processor
//!
//! The orchestrator: claims pending outbox rows one at a time, drives
//! per-row delivery with bounded exponential backoff, marks success, or
//! escalates to the dead-letter table. Row failures never propagate past
//! this layer; only store-level failures reach the worker.

use arkiva_relay_domain::outbox::{ClaimedEntry, OutboxEntry, OutboxError, OutboxStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::backoff::backoff_delay;
use super::dispatcher::{DispatchError, MessageDispatcher};
use super::metrics::{RelayMetrics, RelayMetricsSnapshot};

/// Bounded in-process retry schedule for a single row's delivery.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total delivery attempts per claim, at least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(3),
        }
    }
}

/// Claims batches of pending rows and resolves each to a terminal state.
pub struct RelayProcessor {
    store: Arc<dyn OutboxStore>,
    dispatcher: MessageDispatcher,
    retry: RetryPolicy,
    metrics: RelayMetrics,
}

impl RelayProcessor {
    /// Create a new relay processor.
    pub fn new(store: Arc<dyn OutboxStore>, dispatcher: MessageDispatcher, retry: RetryPolicy) -> Self {
        Self {
            store,
            dispatcher,
            retry,
            metrics: RelayMetrics::new(),
        }
    }

    /// Get a snapshot of current metrics
    pub async fn metrics(&self) -> RelayMetricsSnapshot {
        self.metrics.snapshot().await
    }

    /// Claim and terminally resolve up to `max_batch` pending rows.
    ///
    /// Each row gets its own store transaction, so independent relay
    /// instances interleave over the queue and a crash mid-batch loses
    /// nothing: committed rows stay committed, the in-flight row rolls
    /// back to pending. Returns the number of rows resolved; stops early
    /// once no claimable row remains.
    pub async fn process_batch(&self, max_batch: usize) -> Result<usize, OutboxError> {
        let mut resolved = 0usize;

        for _ in 0..max_batch {
            let Some(claim) = self.store.claim_next().await? else {
                break;
            };

            self.resolve_claim(claim).await?;
            resolved += 1;
        }

        if resolved > 0 {
            self.metrics.inc_batch().await;
        }

        Ok(resolved)
    }

    /// Drive one claimed row to a terminal state.
    ///
    /// Delivery failures are retried up to the policy's attempt budget
    /// with exponential backoff; permanent (configuration) failures skip
    /// the budget entirely. Exhaustion dead-letters the row carrying the
    /// last error. Only store errors surface to the caller.
    async fn resolve_claim(&self, claim: Box<dyn ClaimedEntry>) -> Result<(), OutboxError> {
        let entry = claim.entry().clone();

        match self.deliver_with_retry(&entry).await {
            Ok(()) => {
                claim.mark_processed().await?;
                self.metrics.inc_published().await;
                debug!(entry_id = entry.id, "Outbox entry published");
            }
            Err(e) => {
                let reason = e.to_string();
                error!(entry_id = entry.id, error = %reason, "Dead-lettering outbox entry");
                claim.dead_letter(&reason).await?;
                self.metrics.inc_dead_lettered().await;
            }
        }

        Ok(())
    }

    /// Attempt delivery until it succeeds, the attempt budget is spent,
    /// or a permanent error short-circuits. Returns the last error when
    /// giving up.
    async fn deliver_with_retry(&self, entry: &OutboxEntry) -> Result<(), DispatchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.dispatcher.dispatch(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_permanent() => {
                    warn!(
                        entry_id = entry.id,
                        aggregate = %entry.aggregate,
                        error = %e,
                        "Configuration failure, giving up without retry"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        entry_id = entry.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Delivery attempt failed"
                    );

                    if attempt >= max_attempts {
                        return Err(e);
                    }

                    self.metrics.inc_retried().await;
                    sleep(backoff_delay(
                        attempt,
                        self.retry.initial_delay,
                        self.retry.max_delay,
                    ))
                    .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{entry_for, MemoryOutboxStore, RecordingPublisher};
    use arkiva_relay_domain::envelope::EventEnvelope;
    use arkiva_relay_domain::routing::TopicRouter;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn processor(
        store: MemoryOutboxStore,
        publisher: Arc<RecordingPublisher>,
        retry: RetryPolicy,
    ) -> RelayProcessor {
        let dispatcher = MessageDispatcher::new(TopicRouter::arkiva_defaults(), publisher);
        RelayProcessor::new(Arc::new(store), dispatcher, retry)
    }

    #[tokio::test]
    async fn test_successful_batch_resolves_rows_in_order() {
        let aggregate_id = Uuid::new_v4();
        let store = MemoryOutboxStore::with_entries(
            (1..=5).map(|id| entry_for(id, "document", aggregate_id)).collect(),
        );
        let publisher = Arc::new(RecordingPublisher::reliable());
        let processor = processor(store.clone(), publisher.clone(), RetryPolicy::default());

        let resolved = processor.process_batch(10).await.unwrap();

        assert_eq!(resolved, 5);
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.processed_ids().len(), 5);
        assert!(store.dead_letters().is_empty());

        // All five share a key and come out in claim (id) order.
        let published = publisher.published();
        assert_eq!(published.len(), 5);
        let ids: Vec<i64> = published
            .iter()
            .map(|m| {
                let envelope: EventEnvelope = serde_json::from_slice(&m.payload).unwrap();
                assert_eq!(envelope.aggregate_id, aggregate_id);
                envelope.data["entry"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_batch_stops_early_when_queue_is_drained() {
        let store =
            MemoryOutboxStore::with_entries(vec![entry_for(1, "document", Uuid::new_v4())]);
        let publisher = Arc::new(RecordingPublisher::reliable());
        let processor = processor(store, publisher, RetryPolicy::default());

        assert_eq!(processor.process_batch(100).await.unwrap(), 1);
        assert_eq!(processor.process_batch(100).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_recover_within_budget() {
        let store =
            MemoryOutboxStore::with_entries(vec![entry_for(1, "document", Uuid::new_v4())]);
        let publisher = Arc::new(RecordingPublisher::failing_times(2));
        let processor = processor(store.clone(), publisher.clone(), RetryPolicy::default());

        let resolved = processor.process_batch(1).await.unwrap();

        assert_eq!(resolved, 1);
        assert_eq!(publisher.attempts(), 3);
        assert_eq!(publisher.published().len(), 1);
        assert!(store.dead_letters().is_empty());

        let snapshot = processor.metrics().await;
        assert_eq!(snapshot.total_retried, 2);
        assert_eq!(snapshot.total_published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_dead_letter_with_last_error() {
        let store =
            MemoryOutboxStore::with_entries(vec![entry_for(9, "document", Uuid::new_v4())]);
        let publisher = Arc::new(RecordingPublisher::failing());
        let processor = processor(store.clone(), publisher.clone(), RetryPolicy::default());

        let resolved = processor.process_batch(1).await.unwrap();

        // A dead-lettered row is resolved from the relay's perspective.
        assert_eq!(resolved, 1);
        assert_eq!(publisher.attempts(), 3);
        assert!(publisher.published().is_empty());
        assert_eq!(store.pending_count(), 0);

        let dead = store.dead_letters();
        assert_eq!(dead.len(), 1);
        assert!(dead[&9].contains("broker unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_is_exact() {
        let store =
            MemoryOutboxStore::with_entries(vec![entry_for(1, "document", Uuid::new_v4())]);
        let publisher = Arc::new(RecordingPublisher::failing());
        let processor = processor(store, publisher, RetryPolicy::default());

        let started = tokio::time::Instant::now();
        processor.process_batch(1).await.unwrap();

        // 200ms after attempt 1, 400ms after attempt 2, none after the
        // final attempt.
        assert_eq!(started.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_unmapped_aggregate_dead_letters_on_first_attempt() {
        let store =
            MemoryOutboxStore::with_entries(vec![entry_for(4, "unknown-type", Uuid::new_v4())]);
        let publisher = Arc::new(RecordingPublisher::reliable());
        let processor = processor(store.clone(), publisher.clone(), RetryPolicy::default());

        let resolved = processor.process_batch(1).await.unwrap();

        assert_eq!(resolved, 1);
        assert_eq!(publisher.attempts(), 0);

        let dead = store.dead_letters();
        assert_eq!(dead.len(), 1);
        assert!(dead[&4].contains("unknown-type"));

        let snapshot = processor.metrics().await;
        assert_eq!(snapshot.total_retried, 0);
        assert_eq!(snapshot.total_dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_concurrent_processors_never_share_a_row() {
        let aggregate_ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let entries = (1..=20)
            .map(|id| entry_for(id, "document", aggregate_ids[(id as usize) % 4]))
            .collect();
        let store = MemoryOutboxStore::with_entries(entries);
        let publisher =
            Arc::new(RecordingPublisher::reliable().with_delay(Duration::from_millis(1)));

        let left = Arc::new(processor(store.clone(), publisher.clone(), RetryPolicy::default()));
        let right = Arc::new(processor(store.clone(), publisher.clone(), RetryPolicy::default()));

        // The store double panics if a row is claimed while locked or
        // resolved twice, so racing two processors proves exclusivity.
        let left_task = {
            let left = left.clone();
            tokio::spawn(async move { left.process_batch(20).await.unwrap() })
        };
        let right_task = {
            let right = right.clone();
            tokio::spawn(async move { right.process_batch(20).await.unwrap() })
        };

        let (left_resolved, right_resolved) =
            (left_task.await.unwrap(), right_task.await.unwrap());

        assert_eq!(left_resolved + right_resolved, 20);
        assert_eq!(store.pending_count(), 0);
        assert_eq!(publisher.published().len(), 20);
    }

    #[tokio::test]
    async fn test_per_aggregate_ordering_is_preserved() {
        let aggregate_id = Uuid::new_v4();
        let base = Utc::now();
        let entries = (1..=5)
            .map(|id| {
                let mut entry = entry_for(id, "document", aggregate_id);
                entry.occurred_at = base + ChronoDuration::milliseconds(id);
                entry
            })
            .collect();
        let store = MemoryOutboxStore::with_entries(entries);
        let publisher = Arc::new(RecordingPublisher::reliable());
        let processor = processor(store, publisher.clone(), RetryPolicy::default());

        processor.process_batch(10).await.unwrap();

        let occurred: Vec<_> = publisher
            .published()
            .iter()
            .map(|m| {
                let envelope: EventEnvelope = serde_json::from_slice(&m.payload).unwrap();
                envelope.occurred_at_utc
            })
            .collect();

        let mut sorted = occurred.clone();
        sorted.sort();
        assert_eq!(occurred, sorted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_republication_reuses_the_event_id() {
        // Simulated crash-replay: the same row dispatched twice must carry
        // a byte-identical eventId for consumer-side deduplication.
        let entry = entry_for(6, "document", Uuid::new_v4());

        let publisher = Arc::new(RecordingPublisher::reliable());
        let first = processor(
            MemoryOutboxStore::with_entries(vec![entry.clone()]),
            publisher.clone(),
            RetryPolicy::default(),
        );
        first.process_batch(1).await.unwrap();

        let second = processor(
            MemoryOutboxStore::with_entries(vec![entry]),
            publisher.clone(),
            RetryPolicy::default(),
        );
        second.process_batch(1).await.unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].message_id, published[1].message_id);
        assert_eq!(published[0].payload, published[1].payload);
    }
}
