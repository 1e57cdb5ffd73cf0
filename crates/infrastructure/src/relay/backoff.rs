//! Retry backoff schedule.
//!
//! A pure function of the attempt number: the delay doubles from the
//! initial value and is capped at the maximum. No state, no jitter — the
//! schedule is exact and testable.

use std::time::Duration;

/// Delay to wait after the given failed attempt (1-based).
///
/// `backoff_delay(1, 200ms, 3s) == 200ms`, attempt 2 waits 400ms, and so
/// on, saturating at `max`.
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay = initial.saturating_mul(2u32.saturating_pow(exponent));
    delay.min(max)
}
