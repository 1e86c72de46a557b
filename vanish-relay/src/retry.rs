use crate::error::RelayResult;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Runs `op` up to `max_attempts` times, sleeping `base_delay * 2^attempt`
/// between attempts. Only transient errors are retried.
pub(crate) async fn with_backoff<T, F, Fut>(
    what: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> RelayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RelayResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let backoff = base_delay.saturating_mul(1 << attempt.min(16));
                warn!("{what} failed ({e}), retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
