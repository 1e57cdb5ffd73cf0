//! The relay engine: dispatcher, processor, worker.

pub mod backoff;
pub mod dispatcher;
pub mod metrics;
pub mod processor;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::backoff_delay;
pub use dispatcher::{DispatchError, MessageDispatcher};
pub use metrics::{RelayMetrics, RelayMetricsSnapshot};
pub use processor::{RelayProcessor, RetryPolicy};
pub use worker::{RelayWorker, RelayWorkerConfig};
