//! The "process one notification" entrypoint: fetch, decode, parse,
//! transform, publish.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::decode::decode;
use crate::ingest::notification::ObjectRef;
use crate::metrics::CounterSink;
use crate::publish::Batcher;
use crate::scan::parse;
use crate::store::ObjectStore;
use crate::transform::Transformer;

/// Soft per-message budget; exceeding it is logged, not fatal.
const PROCESSING_BUDGET: Duration = Duration::from_secs(5);

/// Terminal disposition of one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed; ack the message.
    Ok,
    /// Dependency trouble; leave the message for redelivery.
    Retriable,
    /// The payload is permanently bad; ack and move on.
    Drop,
}

pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    transformer: Arc<Transformer>,
    batcher: Arc<Batcher>,
    metrics: Arc<dyn CounterSink>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transformer: Arc<Transformer>,
        batcher: Arc<Batcher>,
        metrics: Arc<dyn CounterSink>,
    ) -> Self {
        Self {
            store,
            transformer,
            batcher,
            metrics,
        }
    }

    pub async fn process(&self, object: &ObjectRef) -> Outcome {
        let started = Instant::now();

        let raw = match self.store.get(&object.bucket, &object.key).await {
            Ok(raw) => raw,
            Err(e) if e.is_permanent() => {
                warn!(bucket = %object.bucket, key = %object.key, error = %e, "object unavailable, dropping");
                self.metrics.incr("fetch_permanent_error");
                return Outcome::Drop;
            }
            Err(e) => {
                warn!(bucket = %object.bucket, key = %object.key, error = %e, "object fetch failed, will retry");
                self.metrics.incr("fetch_transient_error");
                return Outcome::Retriable;
            }
        };

        let json = match decode(&raw) {
            Ok(json) => json,
            Err(e) => {
                warn!(bucket = %object.bucket, key = %object.key, error = %e, "payload decode failed, dropping");
                self.metrics.incr("payload_decode_error");
                return Outcome::Drop;
            }
        };

        let scan = match parse(&json) {
            Ok(scan) => scan,
            Err(e) => {
                warn!(bucket = %object.bucket, key = %object.key, error = %e, "payload parse failed, dropping");
                self.metrics.incr("payload_parse_error");
                return Outcome::Drop;
            }
        };

        let batch_id = Uuid::new_v4().to_string();
        let records = self.transformer.transform(&scan, &batch_id);
        let emitted = records.len();
        for record in &records {
            self.batcher.publish(record).await;
        }
        // Bound per-message latency; delivery itself stays async.
        self.batcher.flush().await;

        let elapsed = started.elapsed();
        if elapsed > PROCESSING_BUDGET {
            warn!(
                bucket = %object.bucket,
                key = %object.key,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = PROCESSING_BUDGET.as_millis() as u64,
                "notification exceeded processing budget"
            );
        }
        debug!(
            bucket = %object.bucket,
            key = %object.key,
            records = emitted,
            elapsed_ms = elapsed.as_millis() as u64,
            "notification processed"
        );
        self.metrics.incr("notifications_ok");
        Outcome::Ok
    }
}
