// src/publish/sender.rs
use bytes::Bytes;
use std::sync::Arc;
use tracing::error;

use crate::metrics::CounterSink;

/// Result of delivering one batch, after internal retries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Trait for shipping a batch of serialized records downstream
/// (abstracts the Firehose client).
#[async_trait::async_trait]
pub trait DeliverySender: Send + Sync {
    async fn deliver(&self, batch: Vec<Bytes>) -> DeliveryOutcome;
}

/// Sink for records that exhausted delivery retries.
#[async_trait::async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, records: Vec<Bytes>, reason: &str);
}

/// Default dead-letter sink: log and count. Operators who need durable
/// dead-lettering plug in their own sink.
pub struct LoggingDeadLetter {
    metrics: Arc<dyn CounterSink>,
}

impl LoggingDeadLetter {
    pub fn new(metrics: Arc<dyn CounterSink>) -> Self {
        Self { metrics }
    }
}

#[async_trait::async_trait]
impl DeadLetterSink for LoggingDeadLetter {
    async fn dead_letter(&self, records: Vec<Bytes>, reason: &str) {
        error!(
            records = records.len(),
            bytes = records.iter().map(Bytes::len).sum::<usize>(),
            reason,
            "records dead-lettered"
        );
        for _ in &records {
            self.metrics.incr("dead_letter_records");
        }
    }
}
