use std::future::Future;
use std::time::Duration;

/// Retry configuration: exponential backoff with symmetric jitter,
/// `delay = clamp(base * 2^attempt * jitter, max)` with jitter drawn
/// from [0.8, 1.2].
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // 1 initial + 2 retries, 100ms base, 10s cap
        Self::exponential(3, 100, 10_000)
    }
}

impl RetryConfig {
    pub fn exponential(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts,
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// Calculate the delay preceding retry `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let scaled = base_ms.saturating_mul(2_u64.saturating_pow(attempt));
        let jittered = apply_jitter(scaled);
        Duration::from_millis(jittered).min(self.max)
    }
}

/// Spread delays by ±20% so concurrent workers do not retry in lockstep.
fn apply_jitter(delay_ms: u64) -> u64 {
    if delay_ms == 0 {
        return 0;
    }
    use rand::Rng;
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    (delay_ms as f64 * factor) as u64
}

/// Trait for errors that may be retryable
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// Execute an async operation with retries.
/// Only retries on transient errors (as determined by IsRetryable trait).
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable,
{
    let attempts = config.max_attempts.max(1);
    let mut last_error: Option<E> = None;

    for attempt in 0..attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = config.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    max = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error"
                );
                last_error = Some(e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.expect("retry loop should have returned an error"))
}
