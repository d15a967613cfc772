// tests/delivery_retry.rs
//
// Retry and classification behavior of the delivery path.

use scan2stream::publish::classify::{classify_parts, ErrorClass};
use scan2stream::publish::retry::{with_retry, IsRetryable, RetryConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
struct RateLimited;

impl IsRetryable for RateLimited {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// A rate-limited first attempt succeeds on retry, after at least the
/// base backoff delay.
#[tokio::test]
async fn transient_failure_then_success() {
    let config = RetryConfig::exponential(3, 20, 1_000);
    let call_count = Arc::new(AtomicU32::new(0));
    let count = call_count.clone();
    let started = Instant::now();

    let result: Result<&str, RateLimited> = with_retry(&config, || {
        let attempt = count.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(RateLimited)
            } else {
                Ok("delivered")
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "delivered");
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
    // Backoff ran: base 20ms minus 20% jitter.
    assert!(started.elapsed().as_millis() >= 16);
}

#[test]
fn throttling_is_classified_rate_limit() {
    assert_eq!(
        classify_parts(Some("ThrottlingException"), "Rate exceeded", &[]),
        ErrorClass::RateLimit
    );
}

#[test]
fn rate_limit_backs_off_longer() {
    assert_eq!(ErrorClass::RateLimit.backoff_multiplier(), 2);
    assert_eq!(ErrorClass::BufferFull.backoff_multiplier(), 2);
    assert_eq!(ErrorClass::NetworkIssue.backoff_multiplier(), 1);
    assert_eq!(ErrorClass::GenericFailure.backoff_multiplier(), 1);
}

/// Records are chunked at the 500-record Firehose limit by the batcher
/// caps, never by the sender.
#[test]
fn default_batch_limits_match_firehose() {
    let limits = scan2stream::publish::BatchLimits::default();
    assert_eq!(limits.max_batch_count, 500);
    assert_eq!(limits.max_batch_bytes, 4_000_000);
    assert_eq!(limits.max_record_bytes, 1_000_000);
}
