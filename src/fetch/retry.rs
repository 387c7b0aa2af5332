// src/fetch/retry.rs
//
// Generic retry combinator: a backoff schedule plus a retryable-error
// predicate, decoupled from the call being retried. One attempt per
// schedule entry; a retryable failure sleeps the entry's delay, any
// other failure propagates immediately, and running out of schedule
// surfaces the caller's terminal error.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Delays applied between attempts against a rate-limited source.
pub const BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_millis(500),
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

pub async fn with_backoff<T, E, F, Fut, R, X>(
    schedule: &[Duration],
    retryable: R,
    exhausted: X,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    X: FnOnce() -> E,
    E: std::fmt::Display,
{
    for (attempt, &delay) in schedule.iter().enumerate() {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if retryable(&err) => {
                warn!(attempt, delay = ?delay, error = %err, "transient error, backing off");
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
    Err(exhausted())
}
