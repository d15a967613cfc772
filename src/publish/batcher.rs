//! Size-aware batch accumulator over serialized measurement records.
//!
//! All batch state lives behind a single mutex. Emission swaps the
//! filled batch out under the lock and hands it to an async delivery
//! task after the lock is released; a bounded number of delivery tasks
//! may be in flight at once, and `publish` blocks once that ceiling is
//! reached. A record is never split across batches.

use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::metrics::CounterSink;
use crate::publish::sender::DeliverySender;
use crate::schema::Measurement;

/// Hard caps mirroring the downstream stream's limits.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_batch_count: usize,
    pub max_batch_bytes: usize,
    pub max_record_bytes: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch_count: 500,
            max_batch_bytes: 4_000_000,
            max_record_bytes: 1_000_000,
        }
    }
}

/// Consistent snapshot of the accumulating batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStatus {
    pub count: usize,
    pub bytes: usize,
}

#[derive(Default)]
struct BatchState {
    records: Vec<Bytes>,
    bytes: usize,
}

impl BatchState {
    fn take(&mut self) -> Vec<Bytes> {
        self.bytes = 0;
        std::mem::take(&mut self.records)
    }
}

pub struct Batcher {
    limits: BatchLimits,
    state: Mutex<BatchState>,
    in_flight: Arc<Semaphore>,
    sender: Arc<dyn DeliverySender>,
    metrics: Arc<dyn CounterSink>,
}

impl Batcher {
    pub fn new(
        limits: BatchLimits,
        sender: Arc<dyn DeliverySender>,
        max_in_flight_batches: usize,
        metrics: Arc<dyn CounterSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            limits,
            state: Mutex::new(BatchState::default()),
            in_flight: Arc::new(Semaphore::new(max_in_flight_batches.max(1))),
            sender,
            metrics,
        })
    }

    /// Serialize and accept one record. Serialization failures and
    /// oversize records are dropped here; neither disturbs the batch.
    pub async fn publish(&self, record: &Measurement) {
        let mut data = match serde_json::to_vec(record) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, bssid = %record.bssid, "record serialization failed, dropping");
                self.metrics.incr("publish_serialize_error");
                return;
            }
        };
        data.push(b'\n'); // NDJSON format
        self.accept(Bytes::from(data)).await;
    }

    async fn accept(&self, record: Bytes) {
        if record.len() > self.limits.max_record_bytes {
            error!(
                record_bytes = record.len(),
                max = self.limits.max_record_bytes,
                "record exceeds size cap, dropping"
            );
            self.metrics.incr("publish_record_oversize");
            return;
        }

        let mut full_batches = Vec::new();
        {
            let mut state = self.lock();
            // Emit-then-add when the record would overflow either cap.
            if !state.records.is_empty()
                && (state.records.len() + 1 > self.limits.max_batch_count
                    || state.bytes + record.len() > self.limits.max_batch_bytes)
            {
                full_batches.push(state.take());
            }
            state.bytes += record.len();
            state.records.push(record);
            self.metrics.incr("records_published");
            if state.records.len() >= self.limits.max_batch_count
                || state.bytes >= self.limits.max_batch_bytes
            {
                full_batches.push(state.take());
            }
        }
        for batch in full_batches {
            self.emit(batch).await;
        }
    }

    /// Emit the current batch if non-empty. Returns once emission has
    /// been scheduled; delivery completes asynchronously.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.lock();
            if state.records.is_empty() {
                return;
            }
            state.take()
        };
        self.emit(batch).await;
    }

    pub fn status(&self) -> BatchStatus {
        let state = self.lock();
        BatchStatus {
            count: state.records.len(),
            bytes: state.bytes,
        }
    }

    /// Periodic flush so records accumulated across notifications still
    /// ship within the linger bound.
    pub fn start_linger(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let batcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                batcher.flush().await;
            }
        })
    }

    /// Hand a full batch to the delivery task. Blocks while the
    /// in-flight ceiling is reached; this is the pipeline's only
    /// explicit backpressure point.
    async fn emit(&self, batch: Vec<Bytes>) {
        let permit = match self.in_flight.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed, shutting down
        };
        let count = batch.len();
        let bytes: usize = batch.iter().map(Bytes::len).sum();
        debug!(count, bytes, "emitting batch");
        self.metrics.incr("batches_emitted");

        let sender = Arc::clone(&self.sender);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = sender.deliver(batch).await;
            if outcome.failed > 0 {
                warn!(
                    delivered = outcome.delivered,
                    failed = outcome.failed,
                    "batch delivery completed with failures"
                );
                metrics.incr("batches_failed");
            } else {
                metrics.incr("batches_delivered");
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, BatchState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
