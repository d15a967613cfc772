//! Firehose client implementing DeliverySender with retry classification.

use aws_sdk_firehose::{
    error::ProvideErrorMetadata, operation::RequestId, primitives::Blob, types::Record,
    Client as AwsClient,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::metrics::CounterSink;
use crate::publish::classify::{classify_error, classify_parts, ErrorClass};
use crate::publish::retry::RetryConfig;
use crate::publish::sender::{DeadLetterSink, DeliveryOutcome, DeliverySender};

/// Deadline on a single PutRecordBatch call.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Firehose delivery with per-record resubmission.
///
/// Retries API-level errors and partial failures up to `max_attempts`,
/// with backoff scaled by the failure class; records that survive every
/// attempt go to the dead-letter sink.
pub struct FirehoseSender {
    client: AwsClient,
    stream_name: String,
    retry: RetryConfig,
    dead_letter: Arc<dyn DeadLetterSink>,
    metrics: Arc<dyn CounterSink>,
}

impl FirehoseSender {
    pub fn new(
        client: AwsClient,
        stream_name: String,
        max_attempts: u32,
        dead_letter: Arc<dyn DeadLetterSink>,
        metrics: Arc<dyn CounterSink>,
    ) -> Self {
        Self {
            client,
            stream_name,
            retry: RetryConfig::exponential(max_attempts, 100, 10_000),
            dead_letter,
            metrics,
        }
    }

    async fn put_batch(
        &self,
        pending: &[Bytes],
    ) -> Result<aws_sdk_firehose::operation::put_record_batch::PutRecordBatchOutput, (ErrorClass, String)>
    {
        let records: Vec<Record> = pending
            .iter()
            .map(|data| {
                Record::builder()
                    .data(Blob::new(data.to_vec()))
                    .build()
                    .map_err(|e| (ErrorClass::GenericFailure, format!("record build failed: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let call = self
            .client
            .put_record_batch()
            .delivery_stream_name(&self.stream_name)
            .set_records(Some(records))
            .send();

        match tokio::time::timeout(DELIVERY_TIMEOUT, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                let code = e.meta().code().map(str::to_string);
                let class = classify_error(&e, code.as_deref());
                let request_id = e.meta().request_id().unwrap_or("unknown").to_string();
                error!(
                    error = %e,
                    code = code.as_deref().unwrap_or("none"),
                    class = class.as_str(),
                    request_id = %request_id,
                    stream = %self.stream_name,
                    "Firehose API call failed"
                );
                Err((class, e.to_string()))
            }
            Err(_) => Err((
                ErrorClass::NetworkIssue,
                format!("delivery call timed out after {:?}", DELIVERY_TIMEOUT),
            )),
        }
    }
}

#[async_trait::async_trait]
impl DeliverySender for FirehoseSender {
    async fn deliver(&self, batch: Vec<Bytes>) -> DeliveryOutcome {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut pending = batch;
        let mut delivered = 0usize;
        let mut last_class: Option<ErrorClass> = None;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if pending.is_empty() {
                break;
            }
            if attempt > 0 {
                let mut delay = self.retry.delay_for_attempt(attempt - 1);
                if let Some(class) = last_class {
                    delay *= class.backoff_multiplier();
                }
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.put_batch(&pending).await {
                Ok(response) => response,
                Err((class, message)) => {
                    self.metrics.incr(class.counter());
                    last_error = message;
                    // A generic failure earns a single retry before the
                    // batch drops to dead-letter.
                    if class == ErrorClass::GenericFailure && attempt >= 1 {
                        last_class = Some(class);
                        break;
                    }
                    last_class = Some(class);
                    continue;
                }
            };

            let failed_count = response.failed_put_count();
            if failed_count == 0 {
                delivered += pending.len();
                pending.clear();
                break;
            }

            // Extract failed records for resubmission; log and classify
            // the first failure for backoff selection.
            let mut new_pending = Vec::new();
            let mut first_error_logged = false;
            for (resp, record) in response.request_responses().iter().zip(pending.drain(..)) {
                if resp.error_code().is_some() {
                    if !first_error_logged {
                        let class = classify_parts(
                            resp.error_code(),
                            resp.error_message().unwrap_or(""),
                            &[],
                        );
                        self.metrics.incr(class.counter());
                        warn!(
                            error_code = resp.error_code().unwrap_or("unknown"),
                            error_message = resp.error_message().unwrap_or("none"),
                            class = class.as_str(),
                            stream = %self.stream_name,
                            "Firehose record failure"
                        );
                        last_class = Some(class);
                        last_error = format!(
                            "{}: {}",
                            resp.error_code().unwrap_or("unknown"),
                            resp.error_message().unwrap_or("none")
                        );
                        first_error_logged = true;
                    }
                    new_pending.push(record);
                } else {
                    delivered += 1;
                }
            }
            pending = new_pending;
            warn!(
                attempt,
                failed = pending.len(),
                stream = %self.stream_name,
                "Firehose partial failure, retrying"
            );
        }

        let failed = pending.len();
        if failed > 0 {
            error!(
                failed,
                stream = %self.stream_name,
                "records failed after retry exhaustion"
            );
            let reason = format!(
                "{} after {} attempts: {}",
                last_class.unwrap_or(ErrorClass::GenericFailure).as_str(),
                max_attempts,
                last_error
            );
            self.dead_letter.dead_letter(pending, &reason).await;
        } else {
            self.metrics.incr("delivery_batches_ok");
        }

        DeliveryOutcome { delivered, failed }
    }
}
