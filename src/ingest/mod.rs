//! Notification-driven ingest loop: SQS long-poll, bounded worker pool,
//! ack on terminal outcomes.

pub mod notification;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::{QueueConfig, ShutdownConfig, WorkersConfig};
use crate::metrics::CounterSink;
use crate::pipeline::{Outcome, Pipeline};
use crate::publish::Batcher;
use notification::parse_notification;

pub struct IngestLoop {
    queue: aws_sdk_sqs::Client,
    queue_url: String,
    queue_config: QueueConfig,
    workers: WorkersConfig,
    shutdown_config: ShutdownConfig,
    pipeline: Arc<Pipeline>,
    batcher: Arc<Batcher>,
    metrics: Arc<dyn CounterSink>,
}

impl IngestLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: aws_sdk_sqs::Client,
        queue_url: String,
        queue_config: QueueConfig,
        workers: WorkersConfig,
        shutdown_config: ShutdownConfig,
        pipeline: Arc<Pipeline>,
        batcher: Arc<Batcher>,
        metrics: Arc<dyn CounterSink>,
    ) -> Self {
        Self {
            queue,
            queue_url,
            queue_config,
            workers,
            shutdown_config,
            pipeline,
            batcher,
            metrics,
        }
    }

    /// Run until a shutdown signal arrives, then drain in-flight workers
    /// within the grace period and flush the publisher.
    pub async fn run(self: Arc<Self>) {
        let semaphore = Arc::new(Semaphore::new(self.workers.concurrency));
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        info!(
            queue = %self.queue_url,
            concurrency = self.workers.concurrency,
            "ingest loop started"
        );

        tokio::select! {
            () = self.clone().poll_loop(semaphore, in_flight.clone(), shutdown.clone()) => {}
            () = shutdown_signal() => {
                info!("shutdown signal received, stopping poll loop");
                shutdown.store(true, Ordering::SeqCst);
            }
        }

        let grace = Duration::from_secs(self.shutdown_config.grace_period_seconds);
        let started = std::time::Instant::now();
        while in_flight.load(Ordering::SeqCst) > 0 {
            let remaining = in_flight.load(Ordering::SeqCst);
            if started.elapsed() > grace {
                warn!(remaining, "grace period elapsed with workers in flight");
                break;
            }
            debug!(remaining, "waiting for in-flight workers");
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        self.batcher.flush().await;
        info!("ingest loop stopped");
    }

    async fn poll_loop(
        self: Arc<Self>,
        semaphore: Arc<Semaphore>,
        in_flight: Arc<AtomicUsize>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let received = self
                .queue
                .receive_message()
                .queue_url(&self.queue_url)
                .wait_time_seconds(self.queue_config.poll_wait_seconds)
                .max_number_of_messages(self.queue_config.batch_size)
                .send()
                .await;

            let messages = match received {
                Ok(response) => response.messages.unwrap_or_default(),
                Err(e) => {
                    error!(error = %e, "queue receive failed");
                    self.metrics.incr("queue_receive_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            for message in messages {
                // The fixed pool size is the natural backpressure
                // against the queue: acquisition waits until a worker
                // frees up.
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                in_flight.fetch_add(1, Ordering::SeqCst);

                let ingest = self.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    ingest.handle_message(message).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    }

    async fn handle_message(&self, message: aws_sdk_sqs::types::Message) {
        let body = message.body.as_deref().unwrap_or("");
        let receipt_handle = message.receipt_handle.as_deref();

        let outcome = match AssertUnwindSafe(self.process_body(body)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Left un-acked: the visibility timeout redelivers it.
                error!(
                    message_id = message.message_id.as_deref().unwrap_or("unknown"),
                    "worker panicked while processing message"
                );
                self.metrics.incr("worker_panic");
                return;
            }
        };

        match outcome {
            Outcome::Ok => self.metrics.incr("messages_ok"),
            Outcome::Drop => self.metrics.incr("messages_dropped"),
            Outcome::Retriable => self.metrics.incr("messages_retriable"),
        }

        if should_delete(outcome) {
            if let Some(receipt_handle) = receipt_handle {
                if let Err(e) = self
                    .queue
                    .delete_message()
                    .queue_url(&self.queue_url)
                    .receipt_handle(receipt_handle)
                    .send()
                    .await
                {
                    error!(error = %e, "failed to delete message");
                    self.metrics.incr("queue_delete_error");
                }
            }
        }
    }

    async fn process_body(&self, body: &str) -> Outcome {
        let objects = match parse_notification(body) {
            Ok(objects) => objects,
            Err(e) => {
                warn!(error = %e, "unparseable notification, dropping");
                self.metrics.incr("notification_unknown_shape");
                return Outcome::Drop;
            }
        };

        let mut combined = Outcome::Ok;
        for object in &objects {
            match self.pipeline.process(object).await {
                // One transient failure holds the whole message back;
                // at-least-once semantics make the re-run of its
                // siblings safe.
                Outcome::Retriable => combined = Outcome::Retriable,
                Outcome::Ok | Outcome::Drop => {}
            }
        }
        combined
    }
}

/// A message is deleted on terminal outcomes only; retriable messages
/// reappear after the visibility timeout.
pub fn should_delete(outcome: Outcome) -> bool {
    matches!(outcome, Outcome::Ok | Outcome::Drop)
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
