// src/publish/mod.rs
pub mod batcher;
pub mod classify;
pub mod firehose;
pub mod retry;
pub mod sender;

pub use batcher::{BatchLimits, BatchStatus, Batcher};
pub use classify::ErrorClass;
pub use firehose::FirehoseSender;
pub use sender::{DeadLetterSink, DeliveryOutcome, DeliverySender, LoggingDeadLetter};
