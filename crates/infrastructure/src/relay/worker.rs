//! Relay Worker
//!
//! The outermost loop: polls the relay processor at a configured cadence,
//! drains backlog eagerly, logs throughput, and backs off on unexpected
//! failures. The worker never crashes on a transient infrastructure blip;
//! only an external shutdown signal stops it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info};

use super::processor::RelayProcessor;

/// Configuration for the relay worker loop.
#[derive(Debug, Clone)]
pub struct RelayWorkerConfig {
    /// Maximum rows to resolve per processor call
    pub batch_size: usize,
    /// How long to sleep after an empty poll or a processor failure
    pub poll_interval: Duration,
}

impl Default for RelayWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Polls the relay processor until shut down.
#[derive(Clone)]
pub struct RelayWorker {
    processor: Arc<RelayProcessor>,
    config: RelayWorkerConfig,
    shutdown: broadcast::Sender<()>,
}

impl RelayWorker {
    /// Create a new relay worker.
    pub fn new(processor: Arc<RelayProcessor>, config: RelayWorkerConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            processor,
            config,
            shutdown,
        }
    }

    /// Signal shutdown. In-flight row transactions finish or roll back
    /// cleanly; no new batch is started.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Run the worker loop until shutdown.
    ///
    /// A batch that resolved rows is followed immediately by another
    /// (drain the backlog before idling); an empty batch sleeps
    /// `poll_interval`. Processor failures are logged and absorbed with
    /// the same sleep.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown.subscribe();

        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Outbox relay worker starting"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = self.processor.process_batch(self.config.batch_size) => {
                    match result {
                        Ok(0) => {
                            if !self.idle(&mut shutdown_rx).await {
                                break;
                            }
                        }
                        Ok(resolved) => {
                            info!(resolved, "Resolved outbox batch");
                        }
                        Err(e) => {
                            error!(error = %e, "Outbox batch failed, backing off");
                            if !self.idle(&mut shutdown_rx).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        let snapshot = self.processor.metrics().await;
        info!("Outbox relay worker stopped\n{snapshot}");
    }

    /// Sleep one poll interval; returns false if shutdown arrived first.
    async fn idle(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = shutdown_rx.recv() => false,
            _ = sleep(self.config.poll_interval) => true,
        }
    }
}
