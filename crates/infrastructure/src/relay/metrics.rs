//! Relay metrics.
//!
//! Counters surfaced through periodic log lines; the relay is headless,
//! so logs are its only user-visible behavior.

use std::sync::Arc;
use tokio::sync::Mutex;

/// Metrics collected by the relay processor.
#[derive(Debug, Clone, Default)]
pub struct RelayMetrics {
    published_total: Arc<Mutex<u64>>,
    retried_total: Arc<Mutex<u64>>,
    dead_lettered_total: Arc<Mutex<u64>>,
    batches_total: Arc<Mutex<u64>>,
}

impl RelayMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the published counter
    pub async fn inc_published(&self) {
        let mut count = self.published_total.lock().await;
        *count += 1;
    }

    /// Increment the retry counter
    pub async fn inc_retried(&self) {
        let mut count = self.retried_total.lock().await;
        *count += 1;
    }

    /// Increment the dead-letter counter
    pub async fn inc_dead_lettered(&self) {
        let mut count = self.dead_lettered_total.lock().await;
        *count += 1;
    }

    /// Increment the batch counter
    pub async fn inc_batch(&self) {
        let mut count = self.batches_total.lock().await;
        *count += 1;
    }

    /// Get metrics snapshot
    pub async fn snapshot(&self) -> RelayMetricsSnapshot {
        let published = *self.published_total.lock().await;
        let retried = *self.retried_total.lock().await;
        let dead_lettered = *self.dead_lettered_total.lock().await;
        let batches = *self.batches_total.lock().await;

        let resolved = published + dead_lettered;
        let dead_letter_rate = if resolved > 0 {
            (dead_lettered as f64 / resolved as f64) * 100.0
        } else {
            0.0
        };

        RelayMetricsSnapshot {
            total_published: published,
            total_retried: retried,
            total_dead_lettered: dead_lettered,
            total_batches: batches,
            dead_letter_rate_percent: dead_letter_rate,
        }
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone)]
pub struct RelayMetricsSnapshot {
    pub total_published: u64,
    pub total_retried: u64,
    pub total_dead_lettered: u64,
    pub total_batches: u64,
    pub dead_letter_rate_percent: f64,
}

impl std::fmt::Display for RelayMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Relay Metrics:
  Total Published: {}
  Total Retried: {}
  Total Dead-Lettered: {}
  Total Batches: {}
  Dead-Letter Rate: {:.2}%",
            self.total_published,
            self.total_retried,
            self.total_dead_lettered,
            self.total_batches,
            self.dead_letter_rate_percent
        )
    }
}
