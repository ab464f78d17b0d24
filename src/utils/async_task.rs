use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::StoreError;
use crate::StoreResult;

/// Runs a store operation under the given backoff policy.
///
/// Only transient errors (connection loss, timeouts) are retried; any other
/// error is returned as soon as it is seen. Each attempt is bounded by
/// `policy.timeout_ms`, the delay doubles per attempt up to
/// `policy.max_delay_ms` and carries up to 50% random jitter.
pub(crate) async fn store_op_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> StoreResult<P>
where
    F: Fn() -> T,
    T: Future<Output = StoreResult<P>>,
{
    let max_attempts = policy.max_retries.max(1);
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let e = match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => e,
            Err(_) => StoreError::OperationTimeout,
        };

        if !e.is_transient() || attempt >= max_attempts {
            if attempt > 1 {
                warn!(attempt, "store operation failed after retries: {}", e);
            }
            return Err(e);
        }

        warn!(attempt, "transient store error, backing off: {}", e);
        sleep(jittered(delay)).await;
        delay = (delay * 2).min(max_delay);
    }
}

fn jittered(delay: Duration) -> Duration {
    let base = delay.as_millis() as u64;
    if base == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}
